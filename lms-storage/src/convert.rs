use lms_slo::{errors, Result};

/// Ids travel as strings on the wire and as BIGINT UNSIGNED in the database.
pub fn parse_id(id: &str) -> Result<u64> {
    id.parse::<u64>().map_err(|err| errors::bad_request(&err))
}

pub fn parse_option_id(id: &Option<String>) -> Result<Option<u64>> {
    id.as_deref().map(parse_id).transpose()
}

pub fn and_where(wheres: &mut String, clause: &str) {
    if !wheres.is_empty() {
        wheres.push_str(" AND ");
    }
    wheres.push_str(clause);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(parse_id("-1").is_err());
        assert!(parse_id("abc").is_err());
        assert_eq!(parse_option_id(&None).unwrap(), None);
        assert_eq!(parse_option_id(&Some("7".to_owned())).unwrap(), Some(7));
    }

    #[test]
    fn wheres() {
        let mut wheres = String::new();
        and_where(&mut wheres, "`course_id` = 1");
        and_where(&mut wheres, "`deleted` = 0");
        assert_eq!(wheres, "`course_id` = 1 AND `deleted` = 0");
    }
}
