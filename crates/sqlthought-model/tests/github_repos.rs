//! The bundled GitHub repositories schema description

use sqlthought_model::{CatalogError, ColumnMode, SchemaDescription};

const SCHEMA: &str = include_str!("../../../schemas/github_repos.json");

#[test]
fn test_loads_bundled_schema() {
    let schema = SchemaDescription::from_json(SCHEMA).unwrap();

    assert_eq!(schema.dialect(), "bigquery");
    let names: Vec<&str> = schema.tables.iter().map(|t| t.name()).collect();
    assert!(names.contains(&"bigquery-public-data.github_repos.commits"));
    assert!(names.contains(&"bigquery-public-data.github_repos.licenses"));
}

#[test]
fn test_lookup_by_partial_name() {
    let schema = SchemaDescription::from_json(SCHEMA).unwrap();

    let full = schema.table("`bigquery-public-data.github_repos.licenses`").unwrap();
    let dataset = schema.table("github_repos.licenses").unwrap();
    let bare = schema.table("licenses").unwrap();

    assert_eq!(full.name(), dataset.name());
    assert_eq!(dataset.name(), bare.name());
    assert!(matches!(schema.table("stars"), Err(CatalogError::TableNotFound(_))));
}

#[test]
fn test_commit_columns_flattened() {
    let schema = SchemaDescription::from_json(SCHEMA).unwrap();
    let commits = schema.table("github_repos.commits").unwrap();
    let columns = commits.column_types();

    assert_eq!(columns["commit"], "STRING");
    assert_eq!(columns["parent"], "ARRAY<STRING>");
    assert_eq!(columns["author"], "RECORD");
    assert_eq!(columns["author.date"], "TIMESTAMP");
    assert_eq!(columns["committer.name"], "STRING");

    let commit = commits.table_columns.iter().find(|c| c.name == "commit").unwrap();
    assert_eq!(commit.mode, ColumnMode::Required);
}

#[test]
fn test_markdown_lists_every_table() {
    let schema = SchemaDescription::from_json(SCHEMA).unwrap();
    let markdown = schema.to_markdown();

    for table in &schema.tables {
        assert!(markdown.contains(table.name()), "missing {}", table.name());
    }
}
