use std::path::Path;

use serde::Deserialize;

use super::{Mutation, Row, RowStore, StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureTable {
    pub table: String,
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Seed data, loaded in file order so referenced rows land first
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Fixtures {
    pub tables: Vec<FixtureTable>,
}

impl Fixtures {
    pub fn from_yaml(source: &str) -> Result<Self, StoreError> {
        serde_yaml::from_str(source).map_err(|e| StoreError::Fixture(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Fixture(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&source)
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.tables
            .iter()
            .flat_map(|t| {
                t.rows.iter().map(move |row| Mutation::Insert {
                    table: t.table.clone(),
                    row: row.clone(),
                })
            })
            .collect()
    }

    /// Inserts every fixture row in one atomic batch
    pub async fn seed(&self, store: &dyn RowStore) -> Result<usize, StoreError> {
        let inserted = store.batch(self.mutations()).await?;
        let count = inserted.iter().map(Vec::len).sum();
        tracing::info!("Seeded {} fixture rows across {} tables", count, self.tables.len());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_yaml_keeps_table_order() {
        let fixtures = Fixtures::from_yaml(
            r#"
- table: users
  rows:
    - { id: 1, email: a@b.com }
    - { id: 2, email: c@d.com }
- table: projects
  rows:
    - { id: 1, name: p1, author: 1 }
"#,
        )
        .unwrap();
        assert_eq!(fixtures.row_count(), 3);
        let tables: Vec<String> = fixtures.mutations().iter().map(|m| m.table().to_string()).collect();
        assert_eq!(tables, vec!["users", "users", "projects"]);
    }

    #[test]
    fn test_invalid_yaml_is_a_fixture_error() {
        assert!(matches!(Fixtures::from_yaml("table: [unclosed"), Err(StoreError::Fixture(_))));
    }
}
