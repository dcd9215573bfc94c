use async_std::{
    channel::{unbounded, Receiver},
    task::spawn_local,
};
use log::{debug, warn};
use manual_future::{ManualFuture, ManualFutureCompleter};
use url::Url;

use crate::error::{Result, ShowError};

use super::{
    player_load_show, player_play, player_save_offline, reserve_player_mut, PLAYER_TX,
};

/// Player work that has to await the browser. Synchronous controls call the
/// player directly instead.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    SetBasePath(String),
    LoadShow,
    Play { from: Option<f64> },
    SaveOffline,
}

impl PlayerCommand {
    /// Long-running commands run beside the queue so a slow download never
    /// holds up playback.
    pub fn is_background(&self) -> bool {
        matches!(self, PlayerCommand::LoadShow | PlayerCommand::SaveOffline)
    }
}

pub struct PlayerExecutionItem {
    pub command: PlayerCommand,
    pub completer: Option<ManualFutureCompleter<Result<()>>>,
}

pub fn format_player_cmd(command: &PlayerCommand) -> String {
    match command {
        PlayerCommand::SetBasePath(path) => format!("SetBasePath({})", path),
        PlayerCommand::LoadShow => "LoadShow".to_string(),
        PlayerCommand::Play { from: Some(from) } => format!("Play(from {:.2})", from),
        PlayerCommand::Play { from: None } => "Play".to_string(),
        PlayerCommand::SaveOffline => "SaveOffline".to_string(),
    }
}

/// Accepts absolute URLs and paths relative to the current page.
pub fn parse_base_path(path: &str, page: Option<&str>) -> Option<Url> {
    match Url::parse(path) {
        Ok(url) => Some(url),
        Err(_) => Url::parse(page?).ok()?.join(path).ok(),
    }
}

pub fn init_command_loop() {
    let (tx, rx) = unbounded();
    PLAYER_TX.set(Some(tx));
    spawn_local(run_command_loop(rx));
}

pub async fn run_command_loop(rx: Receiver<PlayerExecutionItem>) {
    debug!("Starting command loop");

    while let Ok(item) = rx.recv().await {
        if item.command.is_background() {
            spawn_local(run_item(item));
        } else {
            run_item(item).await;
        }
    }
}

async fn run_item(item: PlayerExecutionItem) {
    let name = format_player_cmd(&item.command);
    let result = run_player_command(item.command).await;
    if let Err(err) = &result {
        warn!("{} failed: {}", name, err);
    }
    if let Some(completer) = item.completer {
        completer.complete(result).await;
    }
}

pub fn player_dispatch(command: PlayerCommand) {
    let Some(tx) = PLAYER_TX.with_borrow(|tx| tx.clone()) else {
        warn!("Command loop not started, dropping {}", format_player_cmd(&command));
        return;
    };
    if let Err(err) = tx.try_send(PlayerExecutionItem {
        command,
        completer: None,
    }) {
        warn!("Failed to send command to player: {}", err);
    }
}

pub async fn player_dispatch_async(command: PlayerCommand) -> Result<()> {
    let tx = PLAYER_TX
        .with_borrow(|tx| tx.clone())
        .ok_or(ShowError::Unavailable("command loop"))?;
    let (future, completer) = ManualFuture::new();
    tx.send(PlayerExecutionItem {
        command,
        completer: Some(completer),
    })
    .await
    .map_err(|_| ShowError::Unavailable("command loop"))?;
    future.await
}

pub async fn run_player_command(command: PlayerCommand) -> Result<()> {
    match command {
        PlayerCommand::SetBasePath(path) => {
            let page = web_sys::window().and_then(|window| window.location().href().ok());
            let url = parse_base_path(&path, page.as_deref())
                .ok_or_else(|| ShowError::Js(format!("Invalid base path {}", path)))?;
            reserve_player_mut(|player| player.set_base_url(url));
        }
        PlayerCommand::LoadShow => player_load_show().await?,
        PlayerCommand::Play { from } => player_play(from).await?,
        PlayerCommand::SaveOffline => {
            player_save_offline().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_path() {
        assert_eq!(
            parse_base_path("https://cdn.example.com/site/", None).unwrap().as_str(),
            "https://cdn.example.com/site/"
        );
        assert_eq!(
            parse_base_path("assets/", Some("https://example.com/docs/index.html"))
                .unwrap()
                .as_str(),
            "https://example.com/docs/assets/"
        );
        assert_eq!(parse_base_path("assets/", None), None);
    }

    #[test]
    fn test_format_player_cmd() {
        assert_eq!(format_player_cmd(&PlayerCommand::Play { from: Some(12.5) }), "Play(from 12.50)");
        assert_eq!(format_player_cmd(&PlayerCommand::LoadShow), "LoadShow");
    }

    #[test]
    fn test_downloads_run_in_background() {
        assert!(PlayerCommand::LoadShow.is_background());
        assert!(PlayerCommand::SaveOffline.is_background());
        assert!(!PlayerCommand::Play { from: None }.is_background());
    }
}
