use std::fmt::Write as _;
use wallet_core::Navigation;
use wallet_tasks::{PendingTask, TaskSnapshot};

pub const ACTION_ITEMS_HEADER: &str = "Action Items";
pub const NO_ACTION_ITEMS: &str = "No Action Items";

pub fn render_task_list(snapshot: &TaskSnapshot) -> String {
    let mut out = String::new();
    if !snapshot.has_tasks {
        let _ = writeln!(out, "{NO_ACTION_ITEMS}");
    } else {
        let _ = writeln!(out, "{ACTION_ITEMS_HEADER}");
        for (index, task) in snapshot.tasks.iter().enumerate() {
            let _ = match task {
                PendingTask::Eligibility(flag) => writeln!(
                    out,
                    "  {}. {} ({})",
                    index + 1,
                    task.label(),
                    flag.credential_type
                ),
                PendingTask::CredentialOffer(offer) => {
                    writeln!(out, "  {}. {} [{}]", index + 1, task.label(), offer.id())
                }
            };
        }
    }
    if let Some(error) = &snapshot.offer_error {
        let _ = writeln!(out, "warning: offers not refreshed: {error}");
    }
    if let Some(error) = &snapshot.eligibility_error {
        let _ = writeln!(out, "warning: eligibility not loaded: {error}");
    }
    out
}

pub fn render_navigation(navigation: &Navigation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "-> {}", navigation.target.route());
    if let Some(task) = &navigation.task {
        let _ = writeln!(out, "   credential: {} ({})", task.credential_name, task.id);
        let _ = writeln!(out, "   from: {}", task.connection.name);
        let _ = writeln!(out, "   schema: {}", task.schema_id);
        for (name, value) in &task.attributes {
            let _ = writeln!(out, "   {name}: {value}");
        }
    }
    out
}
