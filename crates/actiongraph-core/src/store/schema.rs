pub(super) const SQL: &str = r#"
CREATE TABLE IF NOT EXISTS action_group (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS action (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  group_id INTEGER NOT NULL REFERENCES action_group(id),
  name TEXT NOT NULL,
  type TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  enabled INTEGER NOT NULL DEFAULT 1,
  deprecated INTEGER NOT NULL DEFAULT 0,
  last_modified TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_action_group_name
  ON action(group_id, lower(name)) WHERE type = 'Default';

CREATE TABLE IF NOT EXISTS action_parameter (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  action_id INTEGER NOT NULL REFERENCES action(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  type TEXT NOT NULL DEFAULT '',
  value TEXT NOT NULL DEFAULT '',
  description TEXT NOT NULL DEFAULT '',
  advanced INTEGER NOT NULL DEFAULT 0,
  UNIQUE (action_id, name)
);

CREATE TABLE IF NOT EXISTS action_requirement (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  action_id INTEGER NOT NULL REFERENCES action(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  type TEXT NOT NULL,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS action_edge (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  parent_id INTEGER NOT NULL REFERENCES action(id) ON DELETE CASCADE,
  child_id INTEGER NOT NULL REFERENCES action(id),
  exec_order INTEGER NOT NULL,
  enabled INTEGER NOT NULL DEFAULT 1,
  optional INTEGER NOT NULL DEFAULT 0,
  always_executed INTEGER NOT NULL DEFAULT 0,
  step_name TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_action_edge_parent ON action_edge(parent_id);
CREATE INDEX IF NOT EXISTS idx_action_edge_child ON action_edge(child_id);

CREATE TABLE IF NOT EXISTS action_edge_parameter (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  action_edge_id INTEGER NOT NULL REFERENCES action_edge(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  type TEXT NOT NULL DEFAULT '',
  value TEXT NOT NULL DEFAULT '',
  description TEXT NOT NULL DEFAULT '',
  advanced INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS action_audit (
  action_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  change TEXT NOT NULL,
  versioned TEXT NOT NULL,
  action_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_action_audit_action ON action_audit(action_id);

CREATE TABLE IF NOT EXISTS pipeline_job (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  project_key TEXT NOT NULL,
  project_name TEXT NOT NULL,
  pipeline_name TEXT NOT NULL,
  stage_name TEXT NOT NULL,
  job_name TEXT NOT NULL,
  group_id INTEGER NOT NULL REFERENCES action_group(id),
  action_id INTEGER NOT NULL REFERENCES action(id)
);

CREATE INDEX IF NOT EXISTS idx_pipeline_job_action ON pipeline_job(action_id);
"#;
