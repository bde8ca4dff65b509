/// Router Module Index
///
/// Routes are split by access rule. The authenticated router is wrapped in the
/// `AuthUser` layer in `create_router`.

/// Reads open to anonymous callers when the group is public.
pub mod public;

/// Writes and owner views. Require a session.
pub mod authenticated;
