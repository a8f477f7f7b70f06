/// Router Module Index
///
/// Organizes the application's routing into security-segregated modules so the
/// access boundary for every endpoint is visible at the router level rather
/// than buried in handlers. The three modules map directly to the access
/// tiers of the site.

/// Routes accessible to all clients (anonymous, read-only, plus newsletter
/// signup). Handlers enforce published-only visibility at the repository level.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware: a validated
/// session is required, but no particular role.
pub mod authenticated;

/// Routes restricted to users whose effective role set passes the admin gate.
pub mod admin;
