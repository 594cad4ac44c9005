/// Router Module Index
///
/// Routes are split by access level so the auth layer is applied per module
/// rather than per handler.

/// Pages and account endpoints open to anonymous visitors.
pub mod public;

/// Routes behind the `AuthUser` middleware (login required).
pub mod authenticated;

/// Group and moderation routes; login required and role `admin` checked in each handler.
pub mod admin;
