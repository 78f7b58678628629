use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    Action, ClientContext, ConflictPolicy, RestUserActions, UserActions, UserEdit,
};
use shared::domain::{Administrator, UserId};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod output;

use config::{load_settings, validate, Settings};

#[derive(Parser, Debug)]
#[command(name = "admin", about = "Manage user accounts")]
struct Cli {
    #[arg(long, global = true, default_value = "admin.toml")]
    config: PathBuf,
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List one page of users.
    List {
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show a single user.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Edit a user and save the result.
    Edit(EditArgs),
}

#[derive(Args, Debug)]
struct EditArgs {
    id: String,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[arg(long, conflicts_with = "no_administrator")]
    administrator: bool,
    #[arg(long)]
    no_administrator: bool,
    #[arg(long = "add-role")]
    add_roles: Vec<String>,
    #[arg(long = "remove-role")]
    remove_roles: Vec<String>,
    #[arg(long)]
    conflict_policy: Option<ConflictPolicy>,
}

impl EditArgs {
    fn field_edits(&self) -> Vec<UserEdit> {
        let mut edits = Vec::new();
        if let Some(username) = &self.username {
            edits.push(UserEdit::Username(username.clone()));
        }
        if let Some(password) = &self.password {
            edits.push(UserEdit::Password(password.clone()));
        }
        if self.administrator {
            edits.push(UserEdit::Administrator(Administrator::Super));
        } else if self.no_administrator {
            edits.push(UserEdit::Administrator(Administrator::None));
        }
        edits
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(server_url) = &cli.server_url {
        settings.server_url = server_url.clone();
    }
    validate(&settings)?;
    info!(server_url = %settings.server_url, "admin client starting");

    let context = ClientContext::with_page_count(settings.page_count);
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()
        .context("failed to build http client")?;
    let actions = Arc::new(RestUserActions::with_client(
        http,
        &settings.server_url,
        &context,
    )?);

    match cli.command {
        Command::List { page, filter, json } => list(&context, actions, page, filter, json).await,
        Command::Show { id, json } => show(&context, actions, id, json).await,
        Command::Edit(args) => edit(&context, actions, &settings, args).await,
    }
}

async fn list(
    context: &ClientContext,
    actions: Arc<RestUserActions>,
    page: u32,
    filter: Option<String>,
    json: bool,
) -> Result<()> {
    // Set the filter without fetching; the traverse below syncs once.
    context.dispatch(&Action::Filter { filter })?;
    actions.traverse(page).await.context("failed to list users")?;

    let snapshot = context.users.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&*snapshot.users)?);
    } else {
        print!("{}", output::render_user_list(&snapshot));
    }
    Ok(())
}

async fn show(
    context: &ClientContext,
    actions: Arc<RestUserActions>,
    id: String,
    json: bool,
) -> Result<()> {
    let id = UserId::new(id);
    let mut view = context.user_detailed(id.clone(), actions);
    view.mount()
        .await
        .with_context(|| format!("failed to load user {id}"))?;
    let user = view.user();
    view.unmount()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        print!("{}", output::render_user(user.as_ref()));
    }
    Ok(())
}

async fn edit(
    context: &ClientContext,
    actions: Arc<RestUserActions>,
    settings: &Settings,
    args: EditArgs,
) -> Result<()> {
    let id = UserId::new(args.id.clone());
    let policy = args.conflict_policy.unwrap_or(settings.conflict_policy);
    let mut view = context
        .user_detailed(id.clone(), actions)
        .with_conflict_policy(policy);
    view.mount()
        .await
        .with_context(|| format!("failed to load user {id}"))?;
    if view.user().is_none() {
        view.unmount()?;
        bail!("user {id} not found");
    }

    for edit in args.field_edits() {
        view.set(edit);
    }
    for role in &args.add_roles {
        view.add_role(role.as_str());
    }
    for role in &args.remove_roles {
        view.remove_role(role);
    }

    if !view.changed() {
        println!("nothing to change");
        view.unmount()?;
        return Ok(());
    }

    let saved = view.save().await;
    print!("{}", output::render_draft(&view.state()));
    view.unmount()?;
    saved.with_context(|| format!("failed to save user {id}"))
}
