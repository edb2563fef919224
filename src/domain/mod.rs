//! Domain types for the book store.
//!
//! This module provides:
//! - The `Book` entity and its `BookId`
//! - Lossless `Decimal` for prices

pub mod book;
pub mod decimal;

pub use book::{Book, BookId};
pub use decimal::Decimal;
