use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use client_core::{FileCredentialStore, SocialApiClient, SocialSession, ToggleError};
use shared::{
    domain::{PostId, ToggleKey, UserId},
    protocol::{PostSummary, UserProfile},
};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "social_cli", about = "Follow users and like posts from the terminal")]
struct Args {
    /// Overrides the server url from config and environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Profile {
        user_id: i64,
    },
    /// Flips the follow state for a user.
    Follow {
        user_id: i64,
    },
    Feed {
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// Flips the like state for a post on the given feed page.
    Like {
        post_id: i64,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
}

fn print_profile(profile: &UserProfile) {
    println!(
        "user_id={} username={} followers={} following={} is_following={}",
        profile.user_id,
        profile.username,
        profile.follower_count,
        profile.following_count,
        profile.is_following
    );
}

fn print_post(post: &PostSummary) {
    println!(
        "post_id={} author={} likes={} liked={} {}",
        post.post_id,
        post.author_username.as_deref().unwrap_or("?"),
        post.like_count,
        post.liked_by_me,
        post.body
    );
}

fn report_toggle(
    session: &SocialSession,
    key: ToggleKey,
    result: Result<bool, ToggleError>,
) -> Result<()> {
    let counter = session
        .store()
        .counter(&key)
        .map(|count| count.to_string())
        .unwrap_or_else(|| "?".to_string());
    match result {
        Ok(state) => {
            println!("{key} -> {state} (count={counter})");
            Ok(())
        }
        Err(err) => {
            let shown = session.store().display_state(&key).unwrap_or(false);
            println!("{key} unchanged at {shown} (count={counter})");
            Err(err.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref());
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }

    let credentials = Arc::new(FileCredentialStore::new(settings.credentials_path.clone()));
    let api = SocialApiClient::new(
        &settings.server_url,
        credentials,
        settings.request_timeout(),
    )?;
    let session = SocialSession::new(Arc::new(api));

    match args.command {
        Command::Login { username, password } => {
            session.api().login(&username, &password).await?;
            println!(
                "Logged in as {username}; credentials stored at {}",
                settings.credentials_path.display()
            );
        }
        Command::Logout => {
            session.api().logout()?;
            println!("Logged out");
        }
        Command::Profile { user_id } => {
            let profile = session.load_profile(UserId(user_id)).await?;
            print_profile(&profile);
        }
        Command::Follow { user_id } => {
            let user_id = UserId(user_id);
            session.load_profile(user_id).await?;
            let result = session.toggle_follow(user_id).await;
            report_toggle(&session, ToggleKey::Follow(user_id), result)?;
        }
        Command::Feed { page } => {
            let feed = session.load_feed(page, settings.page_size).await?;
            for post in &feed.posts {
                print_post(post);
            }
            if feed.has_more {
                println!("-- more posts on page {} --", page + 1);
            }
        }
        Command::Like { post_id, page } => {
            let post_id = PostId(post_id);
            let feed = session.load_feed(page, settings.page_size).await?;
            if !feed.posts.iter().any(|post| post.post_id == post_id) {
                return Err(anyhow!("post {post_id} is not on feed page {page}"));
            }
            let result = session.toggle_like(post_id).await;
            report_toggle(&session, ToggleKey::Like(post_id), result)?;
        }
    }

    Ok(())
}
