/// API route handlers
///
/// Resource handlers (products, transactions, reviews, analytics) are supplied
/// by the caller of [`crate::app::build_router`]. This module only holds the
/// routes the edge itself serves:
///
/// - `health`: Health check endpoint

pub mod health;
