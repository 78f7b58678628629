//! Plain-text rendering for the CLI.

use std::fmt::Write as _;

use client_core::{DraftState, UsersSnapshot};
use shared::domain::User;

pub fn render_user_list(snapshot: &UsersSnapshot) -> String {
    let mut out = String::new();
    if snapshot.users.is_empty() {
        out.push_str("no users\n");
    } else {
        let id_width = column_width(snapshot.users.iter().map(|u| u.id.as_str()), "ID");
        let name_width = column_width(
            snapshot.users.iter().map(|u| u.username.as_str()),
            "USERNAME",
        );
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<name_width$}  {:<5}  ROLES",
            "ID", "USERNAME", "ADMIN"
        );
        for user in snapshot.users.iter() {
            let _ = writeln!(
                out,
                "{:<id_width$}  {:<name_width$}  {:<5}  {}",
                user.id,
                user.username,
                if user.administrator.is_super() { "yes" } else { "no" },
                user.roles.join(", ")
            );
        }
    }

    let pages = snapshot.total_pages().max(1);
    let _ = write!(
        out,
        "page {} of {} ({} users",
        u64::from(snapshot.page) + 1,
        pages,
        snapshot.count
    );
    if let Some(filter) = &snapshot.filter {
        let _ = write!(out, " matching '{filter}'");
    }
    out.push_str(")\n");
    out
}

pub fn render_user(user: Option<&User>) -> String {
    let Some(user) = user else {
        return String::new();
    };
    let mut out = String::new();
    let _ = writeln!(out, "id:            {}", user.id);
    let _ = writeln!(out, "username:      {}", user.username);
    let _ = writeln!(
        out,
        "password:      {}",
        if user.password.is_empty() { "" } else { "********" }
    );
    let _ = writeln!(
        out,
        "administrator: {}",
        if user.administrator.is_super() { "yes" } else { "no" }
    );
    let _ = writeln!(out, "roles:         {}", user.roles.join(", "));
    out
}

pub fn render_draft(state: &DraftState) -> String {
    let mut out = render_user(state.user.as_ref());
    if !state.message.is_empty() {
        out.push_str(&state.message);
        out.push('\n');
    }
    out
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>, header: &str) -> usize {
    values.map(str::len).chain([header.len()]).max().unwrap_or(0)
}

#[cfg(test)]
#[path = "tests/output_tests.rs"]
mod tests;
