use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gray used whenever a category has no usable color of its own.
pub const DEFAULT_COLOR: &str = "#6B7280";

/// A named grouping with a display color. Tasks reference categories by
/// `name`, so two categories with the same name are indistinguishable
/// from a task's point of view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,

    pub name: String,

    /// 6-hex-digit color code, e.g. `#3B82F6`.
    pub color: String,
}

impl Category {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color: color.into(),
        }
    }
}

/// The built-in set that seeds an empty store.
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("工作", "#3B82F6"),
        Category::new("学习", "#10B981"),
        Category::new("生活", "#F59E0B"),
        Category::new("购物", "#EF4444"),
        Category::new("其他", DEFAULT_COLOR),
    ]
}

#[cfg(test)]
mod tests {
    use super::default_categories;

    #[test]
    fn default_set_has_five_distinct_names() {
        let categories = default_categories();
        assert_eq!(categories.len(), 5);

        let mut names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
    }
}
