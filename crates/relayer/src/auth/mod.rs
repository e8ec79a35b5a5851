//! Identity & auth (spec §4.6): JWT session tokens (user + admin), TOTP for the admin
//! account, and wallet-signature recovery backing the user login challenge. No admin
//! user table — there is exactly one admin account, configured via environment
//! variables (spec §1 Non-goals: "Admin CRUD... peripheral").

pub mod extractors;
pub mod jwt;
pub mod signature;
pub mod totp;

pub use extractors::{AuthAdmin, AuthUser};
