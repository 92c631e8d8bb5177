pub mod db;
pub mod password;

pub use db::DbAdapter;
pub use password::{hash_password, verify_password};
