//! Command implementations, one module per subcommand.

pub mod config;
pub mod create;
pub mod info;
pub mod list;
pub mod purge;
pub mod revoke;

use sudogate_core::IdentityView;

/// Renders one identity row for `list`/`info` output.
pub(crate) fn render_view(view: &IdentityView) -> String {
    let link = view.link.as_deref().unwrap_or("(no active link)");
    format!(
        "{:>6}  {:<24}  {:<32}  {:<16}  {}",
        view.identity.id, view.identity.name, view.identity.email, view.identity.role, link
    )
}

/// Serializes one identity view for `--json` output. The active token
/// travels only inside the link, mirroring the text output.
pub(crate) fn view_to_json(view: &IdentityView) -> serde_json::Value {
    serde_json::json!({
        "id": view.identity.id,
        "name": view.identity.name,
        "email": view.identity.email,
        "role": view.identity.role,
        "provisioned": view.identity.provisioned,
        "link": view.link,
    })
}
