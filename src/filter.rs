// Equality filtering over rows

use crate::record::Row;

/// Conjunctive equality filter built from a query row
///
/// A row matches when, for every column in the query, it has that column
/// with an equal value. Values compare strictly: `Text("25")` never equals
/// `Number(25.0)`. An empty query matches every row.
#[derive(Debug, Clone, Copy)]
pub struct Filter<'a> {
    query: &'a Row,
}

impl<'a> Filter<'a> {
    pub fn new(query: &'a Row) -> Self {
        Self { query }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.query.iter().all(|(key, value)| row.get(key) == Some(value))
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }
}

impl std::fmt::Display for Filter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.query.is_empty() {
            return write!(f, "*");
        }
        for (i, (key, value)) in self.query.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{} = {}", key, value)?;
        }
        Ok(())
    }
}
