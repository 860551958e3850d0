//! Terminal chat surface
//!
//! `gateway-daemon chat` runs a read-eval loop over one [`ChatSession`];
//! `gateway-daemon ask` answers a single question. Answers are rendered with
//! their references footer.
//!
//! Commands inside the loop:
//!
//! - `/examples`: list the frequently asked questions
//! - `/example N`: ask question `N` from that list
//! - `/history`: print past turns, newest first
//! - `/trace`: print the decode trace of the last answer
//! - `/new`: end the session and start a fresh one
//! - `/quit`: end the session and exit
//!
//! Terminal requests are not rate limited.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use gateway_core::{
    render_answer, AgentClient, ChatRequest, ChatService, ChatSession, ClientRateLimiter,
    GatewayConfig, RateLimitConfig, TracingRequestLog,
};

/// Client identity recorded for terminal requests
const CONSOLE_CLIENT: &str = "console";

/// Rendering options shared by `chat` and `ask`
#[derive(Debug, Clone, Default)]
pub struct ConsoleOptions {
    /// Contact named when an answer has no references
    pub support_contact: String,
    /// Print the decode trace after each answer
    pub show_trace: bool,
    /// Frequently asked questions offered by `/examples`
    pub example_prompts: Vec<String>,
}

/// Build the service for terminal surfaces
///
/// Prompt limits come from `config`; the per-client rate limit does not
/// apply to a single local user.
pub fn console_service(config: &GatewayConfig, client: Arc<dyn AgentClient>) -> ChatService {
    ChatService::new(
        client,
        ClientRateLimiter::new(RateLimitConfig::disabled()),
        Arc::new(TracingRequestLog),
    )
    .with_max_prompt_length(config.server.max_prompt_length)
}

/// Read example questions from a JSON array of strings
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a list of strings.
pub fn load_example_prompts(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read example prompts: {}", path.display()))?;
    let prompts: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("Example prompts must be a JSON list of strings: {}", path.display()))?;
    Ok(prompts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect())
}

/// Answer one question and print it
pub async fn ask_once<W: Write>(
    service: &ChatService,
    question: &str,
    options: &ConsoleOptions,
    out: &mut W,
) -> Result<()> {
    let reply = service
        .ask(ChatRequest::new(question).with_client(CONSOLE_CLIENT))
        .await?;

    writeln!(
        out,
        "{}",
        render_answer(&reply.answer, &reply.citations, &options.support_contact)
    )?;
    if options.show_trace {
        writeln!(out, "--- trace ---\n{}", reply.trace)?;
    }
    Ok(())
}

/// Run the interactive loop until `/quit` or end of input
///
/// Returns the session as it was when the loop ended.
pub async fn chat_loop<R, W>(
    service: &ChatService,
    options: &ConsoleOptions,
    input: R,
    out: &mut W,
) -> Result<ChatSession>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut session = ChatSession::new();
    let mut lines = input.lines();

    writeln!(out, "Session {}. Type /quit to exit.", session.id())?;

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/examples" => {
                if options.example_prompts.is_empty() {
                    writeln!(out, "(no example questions configured)")?;
                }
                for (idx, prompt) in options.example_prompts.iter().enumerate() {
                    writeln!(out, "{:>3}. {prompt}", idx + 1)?;
                }
            }
            "/history" => {
                if session.history().is_empty() {
                    writeln!(out, "(no turns yet)")?;
                }
                for turn in session.newest_first() {
                    writeln!(out, "Q: {}\nA: {}\n", turn.question, turn.answer)?;
                }
            }
            "/trace" => {
                if session.last_trace().is_empty() {
                    writeln!(out, "(no trace yet)")?;
                } else {
                    writeln!(out, "{}", session.last_trace())?;
                }
            }
            "/new" => {
                session.end();
                session = ChatSession::new();
                writeln!(out, "Session {}.", session.id())?;
            }
            command if command.starts_with("/example ") => {
                let choice = command["/example ".len()..].trim();
                match pick_example(&options.example_prompts, choice) {
                    Some(question) => {
                        writeln!(out, "Q: {question}")?;
                        answer(service, options, &mut session, question, out).await?;
                    }
                    None => writeln!(
                        out,
                        "Unknown example '{choice}', pick 1 to {}",
                        options.example_prompts.len()
                    )?,
                }
            }
            question => answer(service, options, &mut session, question, out).await?,
        }
    }

    debug!(session_id = %session.id(), turns = session.history().len(), "Chat loop finished");
    session.end();
    Ok(session)
}

fn pick_example<'a>(prompts: &'a [String], choice: &str) -> Option<&'a str> {
    let index = choice.parse::<usize>().ok()?.checked_sub(1)?;
    prompts.get(index).map(String::as_str)
}

/// Ask `question` in `session`, printing the answer or the error
async fn answer<W: Write>(
    service: &ChatService,
    options: &ConsoleOptions,
    session: &mut ChatSession,
    question: &str,
    out: &mut W,
) -> Result<()> {
    let request = ChatRequest::new(question)
        .with_session_id(session.id().as_str())
        .with_client(CONSOLE_CLIENT);

    match service.ask(request).await {
        Ok(reply) => {
            let rendered = render_answer(&reply.answer, &reply.citations, &options.support_contact);
            writeln!(out, "{rendered}")?;
            if options.show_trace {
                writeln!(out, "--- trace ---\n{}", reply.trace)?;
            }
            session.record_turn(question, rendered, reply.trace)?;
        }
        Err(e) => writeln!(out, "Error: {e}")?,
    }
    Ok(())
}
