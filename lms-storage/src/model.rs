use std::{fmt::Display, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use lms_slo::regexp::check_order_by;

#[derive(Debug, Serialize, ToSchema)]
pub struct List<T> {
    pub data: Vec<T>,
    pub limit: u64,
    pub offset: u64,
    pub total: i64,
}

// no `T: Default` bound, rows are never defaulted
impl<T> Default for List<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            limit: 0,
            offset: 0,
            total: 0,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ID {
    pub id: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct Pagination {
    #[serde(default = "Pagination::default_limit", deserialize_with = "from_str")]
    pub limit: u64,
    #[serde(default, deserialize_with = "from_str")]
    pub offset: u64,
    #[serde(default = "Pagination::default_order_by")]
    #[validate(custom(function = "check_order_by"))]
    pub order_by: Option<String>,
    // set by callers that only need the page, never read from the query
    #[serde(skip)]
    pub count_disable: bool,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
            offset: 0,
            order_by: Self::default_order_by(),
            count_disable: false,
        }
    }
}

impl Pagination {
    fn default_limit() -> u64 {
        20
    }

    fn default_order_by() -> Option<String> {
        Some("created_at DESC".to_owned())
    }

    /// Appends the ORDER BY / LIMIT / OFFSET tail to a WHERE clause.
    pub fn convert(&self, wheres: &mut String) {
        if let Some(order_by) = &self.order_by {
            wheres.push_str(" ORDER BY ");
            wheres.push_str(order_by);
        }
        if self.limit > 0 {
            wheres.push_str(&format!(" LIMIT {}", self.limit));
        }
        if self.offset > 0 {
            wheres.push_str(&format!(" OFFSET {}", self.offset));
        }
    }
}

// flattened query structs hand every value over as a string
fn from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Query {
        name: Option<String>,
        #[serde(flatten)]
        pagination: Pagination,
    }

    #[derive(Debug)]
    struct Row {
        _id: u64,
    }

    #[test]
    fn empty_list_of_rows_without_default() {
        let list = List::<Row>::default();
        assert!(list.data.is_empty());
        assert_eq!((list.limit, list.offset, list.total), (0, 0, 0));
    }

    #[test]
    fn defaults() {
        let q: Query = serde_urlencoded::from_str("name=a").unwrap();
        assert_eq!(q.name.as_deref(), Some("a"));
        assert_eq!(q.pagination.limit, 20);
        assert_eq!(q.pagination.offset, 0);
        assert_eq!(q.pagination.order_by.as_deref(), Some("created_at DESC"));
    }

    #[test]
    fn parse_numbers() {
        let q: Query =
            serde_urlencoded::from_str("limit=5&offset=10&order_by=name%20asc")
                .unwrap();
        assert_eq!(q.pagination.limit, 5);
        assert_eq!(q.pagination.offset, 10);
        let mut wheres = String::from("`deleted` = 0");
        q.pagination.convert(&mut wheres);
        assert_eq!(wheres, "`deleted` = 0 ORDER BY name asc LIMIT 5 OFFSET 10");
    }

    #[test]
    fn rejects_bad_limit() {
        assert!(serde_urlencoded::from_str::<Query>("limit=x").is_err());
    }

    #[test]
    fn order_by_is_validated() {
        let p = Pagination {
            order_by: Some("id; DROP TABLE users".to_owned()),
            ..Default::default()
        };
        assert!(p.validate().is_err());
        assert!(Pagination::default().validate().is_ok());
    }
}
