//! Two-level category hierarchy rules.
//!
//! Categories form a tree at most two levels deep: a *collection* has no
//! parent, and a *category* hangs off exactly one collection.

use serde::{Deserialize, Serialize};

/// Position of a category in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryLevel {
    /// Top-level grouping (`parent_id` is null).
    Collection,
    /// Second-level grouping under a collection.
    Category,
}

impl CategoryLevel {
    /// Level implied by whether a parent is set.
    #[must_use]
    pub const fn from_parent(has_parent: bool) -> Self {
        if has_parent {
            Self::Category
        } else {
            Self::Collection
        }
    }
}

/// Violations of the two-level hierarchy.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryDepthError {
    /// The chosen parent is itself a category.
    #[error("parent must be a top-level collection")]
    ParentNotCollection,
    /// A category cannot be its own parent.
    #[error("category cannot be its own parent")]
    SelfParent,
    /// A collection that already has children cannot be moved under another.
    #[error("collection with child categories cannot be nested")]
    HasChildren,
}

/// Check that placing a category under `parent` keeps the tree two levels deep.
///
/// * `is_self` - the proposed parent is the category being edited
/// * `parent_has_parent` - the proposed parent is itself nested
/// * `has_children` - the category being placed already has children
///
/// # Errors
///
/// Returns the [`CategoryDepthError`] describing the violation.
pub const fn validate_parent(
    is_self: bool,
    parent_has_parent: bool,
    has_children: bool,
) -> Result<CategoryLevel, CategoryDepthError> {
    if is_self {
        return Err(CategoryDepthError::SelfParent);
    }
    if parent_has_parent {
        return Err(CategoryDepthError::ParentNotCollection);
    }
    if has_children {
        return Err(CategoryDepthError::HasChildren);
    }
    Ok(CategoryLevel::Category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_parent() {
        assert_eq!(CategoryLevel::from_parent(false), CategoryLevel::Collection);
        assert_eq!(CategoryLevel::from_parent(true), CategoryLevel::Category);
    }

    #[test]
    fn test_validate_parent() {
        assert_eq!(
            validate_parent(false, false, false),
            Ok(CategoryLevel::Category)
        );
        assert_eq!(
            validate_parent(false, true, false),
            Err(CategoryDepthError::ParentNotCollection)
        );
        assert_eq!(
            validate_parent(true, false, false),
            Err(CategoryDepthError::SelfParent)
        );
        assert_eq!(
            validate_parent(false, false, true),
            Err(CategoryDepthError::HasChildren)
        );
    }
}
