//! User accounts: model, input validation, persistence port and the
//! operation service that gates every access.

pub mod command;
pub mod persistence;
pub mod service;
pub mod user;
pub mod validation;

pub use command::{DeletedUser, UserCommand, UserNotification, TOPIC};
pub use persistence::{PersistenceError, UniqueField, UserPersistence};
pub use service::UserService;
pub use user::User;
pub use validation::{Email, Username, validate_email, validate_username};
