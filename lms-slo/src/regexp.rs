use regex::Regex;
use validator::ValidationError;

lazy_static::lazy_static! {
    static ref ORDER_BY_REGEX: Regex = Regex::new(
        r"^[a-z][a-z_]{0,30}[a-z](\s(asc|ASC|desc|DESC))?(,\s?[a-z][a-z_]{0,30}[a-z](\s(asc|ASC|desc|DESC))?)*$",
    )
    .unwrap();

    static ref ENROLLMENT_KEY_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9_-]{1,50}$").unwrap();
}

// 仅允许 `column [asc|desc]` 的逗号分隔列表，防止拼接进 ORDER BY 的注入
pub fn check_order_by(order_by: &str) -> Result<(), ValidationError> {
    if ORDER_BY_REGEX.is_match(order_by) {
        return Ok(());
    }
    Err(ValidationError::new("invalid order_by"))
}

pub fn check_enrollment_key(key: &str) -> Result<(), ValidationError> {
    if ENROLLMENT_KEY_REGEX.is_match(key) {
        return Ok(());
    }
    Err(ValidationError::new("invalid enrollment key"))
}
