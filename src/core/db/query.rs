/// Query Terms Module
///
/// The queries a `Connection` can run, a small builder for them, and the
/// `Cursor` results come back in.
///
/// ```
/// use dbhandle::core::db::Query;
///
/// let query: Query = Query::db("shop").table("orders").limit(5).into();
/// assert_eq!(query.database(), Some("shop"));
/// ```

use crate::core::Result;
use std::fmt;

/// A single result row. Table rows are JSON objects keyed by column name.
pub type Row = serde_json::Value;

/// A query understood by every driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Metadata about a logical database
    Info { database: String },
    /// Names of the tables in a logical database
    TableList { database: String },
    /// Rows of a table, optionally capped
    Table {
        database: String,
        table: String,
        limit: Option<u64>,
    },
    /// A driver-native statement, scoped to a database when one is given
    Sql {
        database: Option<String>,
        statement: String,
    },
}

impl Query {
    /// Starts a query against the named logical database
    pub fn db(name: impl Into<String>) -> DbTerm {
        DbTerm { name: name.into() }
    }

    /// A driver-native statement run against the connection's default database
    pub fn sql(statement: impl Into<String>) -> Query {
        Query::Sql {
            database: None,
            statement: statement.into(),
        }
    }

    /// A driver-native statement run against the named database
    pub fn sql_in(database: impl Into<String>, statement: impl Into<String>) -> Query {
        Query::Sql {
            database: Some(database.into()),
            statement: statement.into(),
        }
    }

    /// Builds a table query where a `limit` of zero means no limit
    pub fn read(database: &str, table: &str, limit: u64) -> Query {
        let term = Query::db(database).table(table);
        if limit > 0 {
            term.limit(limit).into()
        } else {
            term.into()
        }
    }

    /// The logical database this query targets, if it names one
    pub fn database(&self) -> Option<&str> {
        match self {
            Query::Info { database }
            | Query::TableList { database }
            | Query::Table { database, .. } => Some(database),
            Query::Sql { database, .. } => database.as_deref(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Info { database } => write!(f, "db({}).info()", database),
            Query::TableList { database } => write!(f, "db({}).tableList()", database),
            Query::Table {
                database,
                table,
                limit: Some(n),
            } => write!(f, "db({}).table({}).limit({})", database, table, n),
            Query::Table {
                database,
                table,
                limit: None,
            } => write!(f, "db({}).table({})", database, table),
            Query::Sql {
                database: Some(database),
                statement,
            } => write!(f, "db({}).sql({:?})", database, statement),
            Query::Sql {
                database: None,
                statement,
            } => write!(f, "sql({:?})", statement),
        }
    }
}

/// A logical database, the root of most queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTerm {
    name: String,
}

impl DbTerm {
    pub fn info(self) -> Query {
        Query::Info { database: self.name }
    }

    pub fn table_list(self) -> Query {
        Query::TableList { database: self.name }
    }

    pub fn table(self, name: impl Into<String>) -> TableQuery {
        TableQuery {
            database: self.name,
            table: name.into(),
            limit: None,
        }
    }
}

/// A table scan under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    database: String,
    table: String,
    limit: Option<u64>,
}

impl TableQuery {
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }
}

impl From<TableQuery> for Query {
    fn from(term: TableQuery) -> Self {
        Query::Table {
            database: term.database,
            table: term.table,
            limit: term.limit,
        }
    }
}

/// Results of a query, yielded one row at a time
pub struct Cursor {
    items: Box<dyn Iterator<Item = Result<Row>> + Send>,
}

impl Cursor {
    /// A cursor over rows that are already in memory
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Cursor::from_results(rows.into_iter().map(Ok))
    }

    /// A cursor whose rows may fail individually
    pub fn from_results<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<Row>>,
        I::IntoIter: Send + 'static,
    {
        Cursor {
            items: Box::new(items.into_iter()),
        }
    }

    /// Drains the cursor into a vector, stopping at the first failed row
    pub fn to_array(self) -> Result<Vec<Row>> {
        self.items.collect()
    }
}

impl Iterator for Cursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HandleError;
    use serde_json::json;

    #[test]
    fn test_table_query_builder() {
        let query: Query = Query::db("shop").table("orders").limit(5).into();
        assert_eq!(
            query,
            Query::Table {
                database: "shop".to_string(),
                table: "orders".to_string(),
                limit: Some(5),
            }
        );
        assert_eq!(query.to_string(), "db(shop).table(orders).limit(5)");
    }

    #[test]
    fn test_read_zero_limit_is_unconstrained() {
        match Query::read("shop", "orders", 0) {
            Query::Table { limit, .. } => assert_eq!(limit, None),
            other => panic!("Expected table query, got {:?}", other),
        }
        match Query::read("shop", "orders", 3) {
            Query::Table { limit, .. } => assert_eq!(limit, Some(3)),
            other => panic!("Expected table query, got {:?}", other),
        }
    }

    #[test]
    fn test_query_database() {
        assert_eq!(Query::db("shop").info().database(), Some("shop"));
        assert_eq!(Query::db("shop").table_list().database(), Some("shop"));
        assert_eq!(Query::sql("SELECT 1").database(), None);
        assert_eq!(Query::sql_in("crm", "SELECT 1").database(), Some("crm"));
    }

    #[test]
    fn test_cursor_to_array() {
        let cursor = Cursor::from_rows(vec![json!({"id": 1}), json!({"id": 2})]);
        let rows = cursor.to_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], 2);
    }

    #[test]
    fn test_cursor_stops_at_failed_row() {
        let cursor = Cursor::from_results(vec![
            Ok(json!(1)),
            Err(HandleError::Driver("row decode failed".to_string())),
            Ok(json!(3)),
        ]);
        match cursor.to_array() {
            Err(HandleError::Driver(msg)) => assert_eq!(msg, "row decode failed"),
            other => panic!("Expected driver error, got {:?}", other),
        }
    }
}
