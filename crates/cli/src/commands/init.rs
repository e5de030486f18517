//! `agentscope init` — write the default configuration.

use std::path::{Path, PathBuf};

use agentscope_config::AppConfig;

use super::CliResult;

/// Where the config goes when no path is given.
pub fn default_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

pub async fn run(path: Option<&Path>, force: bool) -> CliResult<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_path);

    println!("AgentScope — setup");
    println!("==================\n");

    if config_path.exists() && !force {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    write_default(&config_path)?;
    println!("  Created {}", config_path.display());
    println!("\n  Next steps:");
    println!("   1. Add an API key to {} (or set DASHSCOPE_API_KEY / OPENAI_API_KEY)", config_path.display());
    println!("   2. Run: agentscope chat");
    println!("   3. Or expose the agent to others: agentscope serve\n");
    Ok(())
}

fn write_default(path: &Path) -> CliResult<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_is_under_config_dir() {
        assert!(default_path().ends_with("config.toml"));
    }

    #[tokio::test]
    async fn writes_a_loadable_config_and_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        run(Some(&path), false).await.unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.agent.name, "Friday");

        std::fs::write(&path, "# mine").unwrap();
        run(Some(&path), false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine");

        run(Some(&path), true).await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[agent]"));
    }
}
