// on-disk layout
pub const DEFAULT_INDEX_ROOT_DIR_NAME: &str = "index.disk";
pub const INDEX_DIR_INFIX: &str = "By";
pub const PRIMARY_DIR_SUFFIX: &str = "Primary";

// index constants
pub const UNIQUE_INDEX: &str = "unique";
pub const NORMAL_INDEX: &str = "normal";

/// Stands in for the field name in errors raised by the backlink tracker.
pub const PRIMARY_MARKER: &str = "_PRIMARY_";

/// Directory name of the index root for one `(type, field)` pair.
pub fn index_dir_name(type_name: &str, index_by: &str) -> String {
    format!("{}{}{}", type_name, INDEX_DIR_INFIX, index_by)
}

/// Directory name of the backlink root for one type.
pub fn primary_dir_name(type_name: &str) -> String {
    format!("{}{}", type_name, PRIMARY_DIR_SUFFIX)
}
