//! Operator answer delivery: `hardpy reply`.

use anyhow::{Context, Result};

pub async fn cmd_reply(addr: &str, answer: &str) -> Result<()> {
    hardpy::dialog::send_reply(addr, answer)
        .await
        .with_context(|| format!("Failed to send reply to {}", addr))?;
    println!("{} Reply sent to {}", console::style("✓").green(), addr);
    Ok(())
}
