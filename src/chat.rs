// Terminal front-end for the same conversation flow the web UI drives.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::info;

use crate::completion::CompletionClient;
use crate::config::SETUP_INSTRUCTIONS;
use crate::session::{ProfileForm, SessionError, SessionState};
use crate::zodiac::Constellation;

const QUIT_COMMAND: &str = "/quit";
const RESET_COMMAND: &str = "/reset";

async fn say<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

async fn ask<R, W>(lines: &mut Lines<R>, out: &mut W, label: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    out.write_all(label.as_bytes()).await?;
    out.flush().await?;
    let line = lines.next_line().await.context("Failed to read from input")?;
    Ok(line.map(|l| l.trim().to_string()))
}

/// Collects the profile until it is accepted. `false` means input ended.
async fn collect_profile<R, W>(
    state: &mut SessionState,
    lines: &mut Lines<R>,
    out: &mut W,
) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let signs = Constellation::ALL
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(" ");
    say(out, "✨ 星盘能量收集").await?;

    let Some(name) = ask(lines, out, "🌙 你的名字: ").await? else {
        return Ok(false);
    };
    let constellation_label = format!("⭐ 你的星座 ({}): ", signs);
    let Some(constellation) = ask(lines, out, &constellation_label).await? else {
        return Ok(false);
    };
    let Some(birth_date) = ask(lines, out, "📅 出生日期 (可选, YYYY-MM-DD): ").await? else {
        return Ok(false);
    };
    let Some(birth_time) = ask(lines, out, "⏰ 出生时间 (可选, HH:MM): ").await? else {
        return Ok(false);
    };

    let mut form = ProfileForm {
        name,
        constellation,
        birth_date,
        birth_time,
    };
    loop {
        match state.confirm_profile(form.clone()) {
            Ok(()) => return Ok(true),
            Err(e) => {
                say(out, &format!("❗ {}", e)).await?;
                let Some(constellation) = ask(lines, out, &constellation_label).await? else {
                    return Ok(false);
                };
                form.constellation = constellation;
            }
        }
    }
}

/// Runs an interactive chat over the given input and output.
///
/// `/reset` starts over with a new profile, `/quit` or end of input stops.
pub async fn run_chat<R, W>(client: &dyn CompletionClient, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !client.is_configured() {
        say(out, SETUP_INSTRUCTIONS).await?;
        bail!("API key is not configured");
    }

    let mut lines = input.lines();
    let mut state = SessionState::new();
    say(out, "🔮 Joy 心灵疗愈师").await?;

    'profile: loop {
        if !collect_profile(&mut state, &mut lines, out).await? {
            break;
        }
        say(
            out,
            &format!(
                "✨ 欢迎，{}！我已经读取了你的星盘能量，告诉我你的烦恼吧。（{} 重新设置，{} 退出）",
                state.profile().display_name(),
                RESET_COMMAND,
                QUIT_COMMAND
            ),
        )
        .await?;

        loop {
            let Some(text) = ask(&mut lines, out, "🙂 > ").await? else {
                break 'profile;
            };
            match text.as_str() {
                QUIT_COMMAND => break 'profile,
                RESET_COMMAND => {
                    state.reset();
                    continue 'profile;
                }
                _ => {}
            }
            say(out, "🔮 正在读取星盘能量...").await?;
            match state.submit_turn(&text, client).await {
                Ok(reply) => {
                    let reply = format!("🔮 {}", reply.content);
                    say(out, &reply).await?;
                }
                Err(SessionError::EmptyMessage) => continue,
                Err(e) => say(out, &format!("❗ {}", e)).await?,
            }
        }
    }

    info!(messages = state.transcript().len(), "Chat session finished");
    Ok(())
}
