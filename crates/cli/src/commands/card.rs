//! `agentscope card` — print a remote agent card.

use agentscope_a2a::{A2aClient, AgentCard};

use super::CliResult;

pub async fn run(url: &str) -> CliResult<()> {
    let card = A2aClient::fetch_agent_card(url).await?;
    print!("{}", describe(&card));
    println!();
    println!("{}", serde_json::to_string_pretty(&card)?);
    Ok(())
}

fn describe(card: &AgentCard) -> String {
    let mut out = format!(
        "{} v{} (A2A {})\n  {}\n  endpoint:  {}\n  streaming: {}\n",
        card.name, card.version, card.protocol_version, card.description, card.url, card.capabilities.streaming
    );
    for skill in &card.skills {
        out.push_str(&format!("  skill:     {} — {}\n", skill.name, skill.description));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscope_a2a::AgentSkill;

    #[test]
    fn describes_skills() {
        let card = AgentCard::new("Friday", "helper", "http://127.0.0.1:8080/").with_skill(AgentSkill {
            id: "chat".into(),
            name: "Chat".into(),
            description: "Talk".into(),
            tags: vec![],
            examples: vec![],
        });
        let text = describe(&card);
        assert!(text.starts_with("Friday v1.0.0"));
        assert!(text.contains("skill:     Chat — Talk"));
    }
}
