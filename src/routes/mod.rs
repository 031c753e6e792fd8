//! Router Module Index
//!
//! Splits the API by who may reach it. Access control is layered: the router
//! module decides whether a session is required at all, and each handler asks the
//! authorization gate for the specific resource and action it touches.

/// Routes reachable without a session.
pub mod public;

/// Content routes (pages, page elements, menus) behind the `AuthUser` middleware.
/// Permission checks happen per handler against the caller's role.
pub mod authenticated;

/// User, role and security routes behind the `AuthUser` middleware. Handlers
/// additionally require the admin role.
pub mod admin;
