//! # drivetree-entity
//!
//! Domain entity models for DriveTree. The tree is a single table of
//! parent-pointer nodes; folders and files share one record shape and are
//! told apart by `is_folder`. Database entities derive `sqlx::FromRow`.

pub mod node;
