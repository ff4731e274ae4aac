//! The facade re-exports work together end to end.

use rstest::*;
use strata::migrations::editor_for;
use strata::prelude::*;

fn user() -> TableSchema {
	TableSchema::new("user")
		.column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())
		.column(ColumnDefinition::new("name", FieldType::char()))
}

#[rstest]
#[case(DatabaseType::Postgres, "CREATE TABLE \"user\" (\"id\" SERIAL NOT NULL PRIMARY KEY")]
#[case(DatabaseType::Sqlite, "CREATE TABLE \"user\" (\"id\" INTEGER NOT NULL PRIMARY KEY")]
#[tokio::test]
async fn test_diff_then_plan(#[case] database_type: DatabaseType, #[case] expected: &str) {
	strata_test::init_test_logging();
	let operations = diff_schema(&[user()], &[]).unwrap();
	let migration = Migration::new("0001_initial").operations(operations);
	let editor = editor_for(database_type);
	let mut state = SchemaState::new();

	let plan = migration
		.plan(&mut state, &EmitContext::new(editor.as_ref()))
		.await
		.unwrap();

	assert_eq!(plan.len(), 1);
	assert!(plan[0].actions[0].render_inline(editor.as_ref()).starts_with(expected));
	assert!(state.contains("user"));
}

#[test]
fn test_default_settings_select_sqlite() {
	let settings = MigrationSettings::default();

	assert_eq!(
		DatabaseType::from(settings.database.database_type()),
		DatabaseType::Sqlite
	);
	assert!(settings.atomic);
}
