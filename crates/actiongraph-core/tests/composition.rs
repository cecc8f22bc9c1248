use std::sync::Arc;

use actiongraph_core::config::EngineConfig;
use actiongraph_core::event::{ActionEvent, RecordingSink};
use actiongraph_core::export::Format;
use actiongraph_core::store::PipelineJob;
use actiongraph_core::types::{BINARY_REQUIREMENT, LIST_PARAMETER, MODEL_REQUIREMENT};
use actiongraph_core::{
    Action, ActionError, ActionGraph, ActionType, Binding, ChildAction, ErrorKind, Group,
    Parameter, Requirement,
};

struct World {
    graph: ActionGraph,
    events: Arc<RecordingSink>,
    team: Group,
}

impl World {
    fn new() -> Self {
        let events = Arc::new(RecordingSink::new());
        let mut graph = ActionGraph::in_memory(EngineConfig::default())
            .unwrap()
            .with_events(events.clone());
        let team = graph.create_group("team").unwrap();
        Self {
            graph,
            events,
            team,
        }
    }

    fn shared(&self) -> i64 {
        self.graph.shared_group().id
    }

    fn builtin(&mut self, name: &str) -> Action {
        let a = Action::new(self.shared(), name).with_kind(ActionType::Builtin);
        self.graph.seed(&a).unwrap()
    }

    fn builtin_with(&mut self, a: Action) -> Action {
        self.graph.seed(&a.with_kind(ActionType::Builtin)).unwrap()
    }

    fn insert(&mut self, a: Action) -> Action {
        self.graph.insert(&a, 1).unwrap()
    }
}

fn docker() -> Requirement {
    Requirement::new("docker", BINARY_REQUIREMENT, "docker")
}

fn child_names(a: &Action) -> Vec<&str> {
    a.children.iter().map(|c| c.action.name.as_str()).collect()
}

#[test]
fn insert_then_load_round_trips() {
    let mut w = World::new();
    let clone = w.builtin_with(
        Action::new(w.shared(), "GitClone")
            .with_parameter(Parameter::new("branch", "string", "main"))
            .with_parameter(Parameter::new("depth", "number", "50"))
            .with_requirement(Requirement::new("git", BINARY_REQUIREMENT, "git")),
    );
    let script = w.builtin_with(
        Action::new(w.shared(), "Script")
            .with_parameter(Parameter::new("script", "text", ""))
            .with_requirement(docker()),
    );

    let mut bound_clone = clone.clone();
    bound_clone.parameters[0].value = "release".into();
    let mut bound_script = script.clone();
    bound_script.parameters[0].value = "make test".into();

    let a = Action::new(w.team.id, "build")
        .with_parameter(Parameter::new("target", "string", "all"))
        .with_child(ChildAction::new(bound_clone).with_binding(Binding {
            step_name: "checkout".into(),
            ..Binding::default()
        }))
        .with_child(ChildAction::new(bound_script).with_binding(Binding {
            always_executed: true,
            ..Binding::default()
        }));
    let inserted = w.insert(a);
    let loaded = w.graph.load_by_id(inserted.id).unwrap();

    assert_eq!(loaded, inserted);
    assert_eq!(child_names(&loaded), vec!["GitClone", "Script"]);
    assert_eq!(loaded.children[0].step_name(), "checkout");
    assert_eq!(loaded.children[0].action.parameters[0].value, "release");
    assert_eq!(loaded.children[0].action.parameters[1].value, "50");
    assert!(loaded.children[1].binding.always_executed);
    assert_eq!(loaded.children[1].action.parameters[0].value, "make test");
    let values: Vec<_> = loaded.requirements.iter().map(|r| r.value.as_str()).collect();
    assert_eq!(values, vec!["docker", "git"]);
    assert_eq!(loaded.parameters, vec![Parameter::new("target", "string", "all")]);
}

#[test]
fn update_with_same_children_keeps_edge_content() {
    let mut w = World::new();
    let b = w.builtin("B");
    let c = w.builtin("C");
    let a = w.insert(
        Action::new(w.team.id, "A")
            .with_child(ChildAction::new(b))
            .with_child(ChildAction::new(c).with_binding(Binding {
                optional: true,
                ..Binding::default()
            })),
    );

    let after = w.graph.update(&a, 2).unwrap();
    assert_eq!(after.children, a.children);
    assert_eq!(after.requirements, a.requirements);
}

#[test]
fn child_requirements_propagate_to_parent() {
    let mut w = World::new();
    let b = w.builtin_with(Action::new(w.shared(), "B").with_requirement(docker()));
    let a = w.insert(Action::new(w.team.id, "A").with_child(ChildAction::new(b)));
    assert_eq!(a.requirements.len(), 1);
    assert_eq!(a.requirements[0].kind, BINARY_REQUIREMENT);
    assert_eq!(a.requirements[0].value, "docker");
}

#[test]
fn disabling_clears_requirements() {
    let mut w = World::new();
    let b = w.builtin_with(Action::new(w.shared(), "B").with_requirement(docker()));
    let mut a = w.insert(
        Action::new(w.team.id, "A")
            .with_requirement(Requirement::new("os", MODEL_REQUIREMENT, "debian"))
            .with_child(ChildAction::new(b)),
    );
    assert_eq!(a.requirements.len(), 2);

    a.enabled = false;
    let after = w.graph.update(&a, 1).unwrap();
    assert!(!after.enabled);
    assert!(after.requirements.is_empty());
}

#[test]
fn list_default_is_bound_to_first_item() {
    let mut w = World::new();
    let b = w.builtin_with(
        Action::new(w.shared(), "B").with_parameter(Parameter::new("env", LIST_PARAMETER, "aa;bb;cc")),
    );
    let a = w.insert(Action::new(w.team.id, "A").with_child(ChildAction::new(b)));
    assert_eq!(a.children[0].action.parameters[0].value, "aa");
    // the canonical child keeps its full list
    let b = w.graph.load_by_name("B").unwrap();
    assert_eq!(b.parameters[0].value, "aa;bb;cc");
}

#[test]
fn referenced_action_can_not_be_deleted() {
    let mut w = World::new();
    let a = w.insert(Action::new(w.team.id, "A"));
    let job = w
        .graph
        .add_pipeline_job(&PipelineJob {
            id: 0,
            project_key: "PROJ".into(),
            project_name: "Project".into(),
            pipeline_name: "build".into(),
            stage_name: "compile".into(),
            job_name: "make".into(),
            group_id: w.team.id,
            action_id: a.id,
        })
        .unwrap();

    let err = w.graph.delete(a.id, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(w.graph.load_by_id(a.id).is_ok());

    assert!(w.graph.remove_pipeline_job(job).unwrap());
    w.graph.delete(a.id, 1).unwrap();
    assert!(w.graph.load_by_id(a.id).unwrap_err().is_not_found());
}

#[test]
fn parent_edge_blocks_delete() {
    let mut w = World::new();
    let b = w.insert(Action::new(w.team.id, "B"));
    let a = w.insert(Action::new(w.team.id, "A").with_child(ChildAction::new(b.clone())));
    assert!(matches!(
        w.graph.delete(b.id, 1),
        Err(ActionError::ActionInUse(_))
    ));
    w.graph.delete(a.id, 1).unwrap();
    w.graph.delete(b.id, 1).unwrap();
}

#[test]
fn duplicate_requirement_name_and_type_is_rejected() {
    let mut w = World::new();
    let dup = Action::new(w.team.id, "A")
        .with_requirement(Requirement::new("os", MODEL_REQUIREMENT, "debian"))
        .with_requirement(Requirement::new("os", MODEL_REQUIREMENT, "ubuntu"));
    let err = w.graph.insert(&dup, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let ok = Action::new(w.team.id, "A")
        .with_requirement(Requirement::new("os", MODEL_REQUIREMENT, "debian"))
        .with_requirement(Requirement::new("os", BINARY_REQUIREMENT, "os"));
    assert_eq!(w.insert(ok).requirements.len(), 2);
}

#[test]
fn reordering_children_replaces_edges() {
    let mut w = World::new();
    let b = w.builtin("B");
    let c = w.builtin("C");
    let mut a = w.insert(
        Action::new(w.team.id, "A")
            .with_child(ChildAction::new(b))
            .with_child(ChildAction::new(c)),
    );
    assert_eq!(child_names(&a), vec!["B", "C"]);

    a.children.reverse();
    let after = w.graph.update(&a, 1).unwrap();
    assert_eq!(child_names(&after), vec!["C", "B"]);
    assert_eq!(after.children.len(), 2);
}

#[test]
fn child_from_foreign_group_is_refused() {
    let mut w = World::new();
    let other = w.graph.create_group("other").unwrap();
    let theirs = w.insert(Action::new(other.id, "theirs"));
    let err = w
        .graph
        .insert(&Action::new(w.team.id, "A").with_child(ChildAction::new(theirs)), 1)
        .unwrap_err();
    assert!(matches!(err, ActionError::ChildrenNotFound { .. }));
}

#[test]
fn update_closing_a_loop_is_refused() {
    let mut w = World::new();
    let a = w.insert(Action::new(w.team.id, "A"));
    let b = w.insert(Action::new(w.team.id, "B").with_child(ChildAction::new(a.clone())));
    let c = w.insert(Action::new(w.team.id, "C").with_child(ChildAction::new(b)));

    let mut edit = a.clone();
    edit.children.push(ChildAction::new(c));
    assert!(matches!(
        w.graph.update(&edit, 1),
        Err(ActionError::GraphCycle(_))
    ));
    assert!(w.graph.load_by_id(a.id).unwrap().children.is_empty());
}

#[test]
fn mutations_publish_events_and_audits() {
    let mut w = World::new();
    let mut a = w.insert(Action::new(w.team.id, "A"));
    a.description = "builds things".into();
    w.graph.update(&a, 5).unwrap();
    w.graph.delete(a.id, 6).unwrap();

    let events = w.events.events();
    assert_eq!(events.len(), 3);
    match &events[1] {
        ActionEvent::Updated {
            before,
            after,
            user_id,
        } => {
            assert_eq!(before.description, "");
            assert_eq!(after.description, "builds things");
            assert_eq!(*user_id, 5);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(events[2], ActionEvent::Deleted { user_id: 6, .. }));

    let audits = w.graph.audits(a.id).unwrap();
    assert_eq!(audits.len(), 2);
    assert_eq!(audits[0].change, "action delete");
    assert_eq!(audits[0].action.description, "builds things");
    assert_eq!(audits[1].change, "action update");
    assert_eq!(audits[1].action.description, "");
}

#[test]
fn failed_mutation_publishes_nothing() {
    let mut w = World::new();
    let a = Action::new(w.team.id, "A").with_parameter(Parameter::new("token", "secret", "x"));
    assert!(w.graph.insert(&a, 1).is_err());
    assert!(w.events.events().is_empty());
}

#[test]
fn usage_reports_parents() {
    let mut w = World::new();
    let b = w.insert(Action::new(w.team.id, "B"));
    w.insert(Action::new(w.team.id, "A").with_child(ChildAction::new(b.clone())));
    let usage = w.graph.usage(b.id).unwrap();
    assert!(usage.pipelines.is_empty());
    assert_eq!(usage.actions.len(), 1);
    assert_eq!(usage.actions[0].parent_action_name, "A");
    assert!(!usage.actions[0].warning);
}

#[test]
fn export_and_binary_requirements() {
    let mut w = World::new();
    let b = w.builtin_with(Action::new(w.shared(), "B").with_requirement(docker()));
    w.insert(Action::new(w.team.id, "A").with_child(ChildAction::new(b)));

    let json = w.graph.export(w.team.id, "a", Format::Json).unwrap();
    let v: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(v["name"], "A");
    assert_eq!(v["children"][0]["action"]["name"], "B");

    let bins = w.graph.requirements_distinct_binary().unwrap();
    assert_eq!(bins, vec![docker()]);

    let touched = w
        .graph
        .update_requirements_value("docker", "podman", BINARY_REQUIREMENT)
        .unwrap();
    assert_eq!(touched.len(), 2);
}

#[test]
fn load_all_for_groups_includes_shared_only_when_asked() {
    let mut w = World::new();
    w.builtin("Script");
    w.insert(Action::new(w.team.id, "A"));
    let own = w.graph.load_all_for_groups(&[w.team.id]).unwrap();
    assert_eq!(own.len(), 1);
    let both = w
        .graph
        .load_all_for_groups(&[w.team.id, w.shared()])
        .unwrap();
    assert_eq!(both.len(), 2);
}
