//! HTTP request handlers organized by resource type

pub mod auth;
pub mod health;
pub mod public;
pub mod tasks;
pub mod tenant;
pub mod users;

pub use auth::{
    change_password_handler, login_handler, logout_handler, me_handler,
    password_reset_confirm_handler, password_reset_request_handler, refresh_handler,
    register_handler, revoke_all_sessions_handler,
};
pub use health::health_handler;
pub use public::public_form_tenant_handler;
pub use tasks::{create_task_handler, get_task_handler, list_tasks_handler, update_task_handler};
pub use tenant::get_tenant_handler;
pub use users::{deactivate_user_handler, list_users_handler, update_user_role_handler};
