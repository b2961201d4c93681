pub mod access_grants;
pub mod credentials;
pub mod health;
pub mod manual_tasks;
pub mod provisioning;
pub mod webhooks;
