pub(crate) mod common;
mod followup;
mod routing;
