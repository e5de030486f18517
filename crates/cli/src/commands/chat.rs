//! `agentscope chat` — interactive or single-message chat.

use std::path::Path;

use agentscope_agent::{ReActAgent, UserAgent};
use agentscope_core::{Agent, Msg};
use tracing::warn;

use super::{AgentRuntime, CliResult, load_config, render_events};

pub async fn run(config_path: Option<&Path>, message: Option<String>, stream: bool) -> CliResult<()> {
    let mut config = load_config(config_path)?;
    if stream {
        config.model.stream = true;
    }
    let provider = config.model.provider.clone();
    let model_name = config.model.name.clone();

    let runtime = AgentRuntime::from_config(config).await?;
    let agent = runtime.agent()?;

    if let Some(text) = message {
        turn(&agent, Msg::user("user", text), stream).await?;
        runtime.print_usage();
        return Ok(());
    }

    println!();
    println!("  AgentScope — interactive chat");
    println!();
    println!("  Agent:     {}", agent.name());
    println!("  Provider:  {provider}");
    println!("  Model:     {model_name}");
    let tools: Vec<String> = agent.tool_schemas().into_iter().map(|s| s.name).collect();
    println!("  Tools:     {}", tools.join(", "));
    println!();
    println!("  Type 'exit' or press Ctrl+D to quit; Ctrl+C stops a reply.");
    println!();

    let user = UserAgent::stdin("You");
    loop {
        let msg = match user.call(vec![]).await {
            Ok(msg) => msg,
            Err(_) => break,
        };
        let text = msg.text_content();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }
        if let Err(e) = turn(&agent, msg, stream).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    runtime.print_usage();
    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Run one exchange, interrupting the agent on Ctrl+C.
async fn turn(agent: &ReActAgent, msg: Msg, live: bool) -> CliResult<Msg> {
    let events = agent.stream(vec![msg]).await?;
    let render = render_events(events, live);
    tokio::pin!(render);
    loop {
        tokio::select! {
            result = &mut render => return result,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Could not listen for Ctrl+C");
                    return render.await;
                }
                agent.interrupt().await;
            }
        }
    }
}
