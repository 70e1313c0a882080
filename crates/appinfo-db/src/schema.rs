pub const PACKAGES_TABLE: &str = "packages";

pub const SCHEMA: &str = r#"
CREATE TABLE packages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    score INTEGER NOT NULL DEFAULT 0,
    nose INTEGER NOT NULL DEFAULT 0
);
"#;

/// Columns of the packages table that callers may project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Name,
    Score,
    Nose,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Id, Field::Name, Field::Score, Field::Nose];

    pub fn column(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Name => "name",
            Field::Score => "score",
            Field::Nose => "nose",
        }
    }
}
