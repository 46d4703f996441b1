use colloquy_agent::ResponseOrchestrator;
use colloquy_core::{ColloquyError, Role};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// One line of REPL input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    History,
    Retry,
    Blank,
    Message(&'a str),
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Input::Blank,
            "/quit" | "/exit" => Input::Quit,
            "/history" => Input::History,
            "/retry" => Input::Retry,
            text => Input::Message(text),
        }
    }
}

/// Interactive terminal chat on a single session until `/quit` or EOF.
pub async fn run(orchestrator: Arc<ResponseOrchestrator>, session_id: String) -> anyhow::Result<()> {
    // Reject a bad id up front rather than on the first message.
    let handle = orchestrator.store().get_or_create(&session_id).await?;
    println!(
        "Session '{session_id}' ({} earlier turns). Commands: /history, /retry, /quit",
        handle.len().await
    );
    drop(handle);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let result = match Input::parse(&line) {
            Input::Quit => break,
            Input::Blank => continue,
            Input::History => {
                print_history(&orchestrator, &session_id).await?;
                continue;
            }
            Input::Retry => orchestrator.retry_pending(&session_id).await,
            Input::Message(text) => orchestrator.handle_message(&session_id, text, vec![]).await,
        };

        match result {
            Ok(turn) => println!("assistant> {}", turn.content()),
            Err(e @ ColloquyError::CompletionFailed(_)) => {
                eprintln!("error: {e}");
                eprintln!("(your message was kept; type /retry to try again)");
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

async fn print_history(orchestrator: &ResponseOrchestrator, session_id: &str) -> anyhow::Result<()> {
    let transcript = orchestrator.read_transcript(session_id).await?;
    if transcript.is_empty() {
        println!("(no messages yet)");
    }
    for turn in &transcript {
        let who = match turn.role() {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!(
            "[{}] {who}> {}",
            turn.timestamp().format("%H:%M:%S"),
            turn.content()
        );
        for attachment in turn.attachments() {
            println!("    [attachment: {}, {} bytes]", attachment.name, attachment.len());
        }
    }
    Ok(())
}
