use colored::*;

use crate::store::Message;

const HEADER_WIDTH: usize = 60;

pub fn print_header(model: &str, provider: &str) {
    let line = "─".repeat(HEADER_WIDTH);
    println!("{}", line.black().bold());

    let name = "Boardroom".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}", name, version);

    let info = format!("  {}  •  {}", model, provider).cyan();
    println!("{}", info);

    println!("{}", line.black().bold());
}

/// One chat line: `[time] Name (Role → Recipient): text`
pub fn print_message(message: &Message) {
    let time = message.timestamp.format("%H:%M:%S").to_string().black().bold();
    let who = match &message.recipient_role {
        Some(recipient) => format!("{} ({} → {})", message.user_name, message.role, recipient),
        None => format!("{} ({})", message.user_name, message.role),
    };
    println!("  {} {}: {}", time, who.cyan().bold(), message.text);
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}
