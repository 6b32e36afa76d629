use crate::output::{print_json, print_table};
use crate::settings::{connect, load_config};
use crate::target::parse_user;
use chainblock_core::{Executor, Mutation, Outcome, QuotaLimiter};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum UserSubcommand {
    /// Block one user
    Block { user: String },
    /// Unblock one user
    Unblock { user: String },
    /// Mute one user
    Mute { user: String },
    /// Unmute one user
    Unmute { user: String },
    /// Show how the primary actor relates to a user
    Show { user: String },
}

pub fn run(config_path: &Path, subcmd: UserSubcommand, json: bool) -> anyhow::Result<()> {
    let (user, mutation) = match subcmd {
        UserSubcommand::Block { user } => (user, Some(Mutation::Block)),
        UserSubcommand::Unblock { user } => (user, Some(Mutation::Unblock)),
        UserSubcommand::Mute { user } => (user, Some(Mutation::Mute)),
        UserSubcommand::Unmute { user } => (user, Some(Mutation::Unmute)),
        UserSubcommand::Show { user } => (user, None),
    };
    let screen_name = parse_user(&user)?;
    let config = load_config(config_path)?;

    let rt = super::runtime()?;
    rt.block_on(async {
        let (primary, _) = connect(&config).await?;
        let target = primary.api.user_by_name(&screen_name).await?;

        let Some(mutation) = mutation else {
            return show(&target, json);
        };
        let executor = Executor::new(QuotaLimiter::new(config.session.quota_max));
        let (result, user) = match executor.mutate(&primary, &target, mutation).await? {
            Outcome::Applied(u) => ("applied", u),
            Outcome::AlreadyDone(u) => ("already", u),
            Outcome::Skipped => ("skipped", target),
        };

        if json {
            print_json(&serde_json::json!({
                "action": mutation.as_str(),
                "result": result,
                "user": user,
            }))
        } else {
            println!("{} @{}: {result}", mutation.as_str(), user.screen_name);
            Ok(())
        }
    })
}

fn show(user: &graph_client::User, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(user);
    }
    let flag = |b: bool| if b { "yes" } else { "no" }.to_string();
    print_table(
        &["FIELD", "VALUE"],
        vec![
            vec!["id".into(), user.id_str.clone()],
            vec!["screen_name".into(), user.screen_name.clone()],
            vec!["protected".into(), flag(user.protected)],
            vec!["following".into(), flag(user.following)],
            vec!["followed_by".into(), flag(user.followed_by)],
            vec!["blocking".into(), flag(user.blocking)],
            vec!["blocked_by".into(), flag(user.blocked_by)],
            vec!["muting".into(), flag(user.muting)],
        ],
    );
    Ok(())
}
