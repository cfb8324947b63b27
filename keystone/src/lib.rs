//! Core of the keystone session authentication service.
//!
//! `auth` holds the domain: users, roles, sessions, the repository
//! contract and the stateless [`auth::AuthService`]. `persistence` holds the
//! transaction manager and the storage backends that implement the
//! repository contract.

pub mod auth;
pub mod persistence;
