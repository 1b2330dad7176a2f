// Terminal presentation for the list controller and action notices

use colored::*;

use storykeep_core::{
    ActionNotice, ActionNotifier, Category, ListView, ListingSource, MessageKind, Story,
    StoryListing, StoryStatus,
};

pub struct TerminalView;

impl ListView for TerminalView {
    fn render(&self, listing: &StoryListing) {
        let title = match listing.source {
            ListingSource::Remote => "Stories".bold(),
            ListingSource::Local => "Saved stories (offline)".bold(),
        };
        println!("{} ({} total)", title, listing.cards.len());
        println!();

        for card in &listing.cards {
            println!(
                "  {} {} {}",
                "•".bright_green(),
                card.story.name.bright_cyan(),
                badges(&card.status)
            );
            println!("    {}", card.story.id.dimmed());
            if !card.story.description.is_empty() {
                println!("    {}", truncate(&card.story.description, 72));
            }
        }
        if !listing.cards.is_empty() {
            println!();
        }
    }

    fn show_message(&self, kind: MessageKind, message: &str) {
        match kind {
            MessageKind::Info => println!("{}", message.dimmed()),
            MessageKind::Success => println!("{} {}", "✓".green(), message),
            MessageKind::Warning => println!("{} {}", "⚠".yellow(), message.yellow()),
            MessageKind::Error => eprintln!("{} {}", "✗".red(), message.red()),
        }
    }

    fn redirect_to_login(&self) {
        println!(
            "  Log in with: {}",
            "storykeep login <email> --password <password>".bright_green()
        );
    }

    fn update_badge(&self, id: &str, category: Category, active: bool) {
        let state = if active { "on".green() } else { "off".dimmed() };
        println!("  {} {}: {}", id.dimmed(), category, state);
    }
}

/// Prints notices as terminal lines.
pub struct TerminalNotifier;

impl ActionNotifier for TerminalNotifier {
    fn notify(&self, notice: &ActionNotice) -> anyhow::Result<()> {
        println!("{} {}", "✓".green(), notice);
        Ok(())
    }
}

pub fn badges(status: &StoryStatus) -> String {
    let mut out = Vec::new();
    if status.is_saved {
        out.push("[saved]".bright_blue().to_string());
    }
    if status.is_liked {
        out.push("[liked]".bright_red().to_string());
    }
    if status.is_offline {
        out.push("[offline]".bright_yellow().to_string());
    }
    out.join(" ")
}

pub fn print_story(story: &Story) {
    println!("{}", story.name.bold());
    println!("  ID:          {}", story.id.dimmed());
    if let Some(created_at) = story.created_at {
        println!(
            "  Created:     {}",
            created_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    if let Some((lat, lon)) = story.location() {
        println!("  Location:    {:.4}, {:.4}", lat, lon);
    }
    if !story.photo_url.is_empty() {
        println!("  Photo:       {}", story.photo_url.bright_cyan());
    }
    if !story.description.is_empty() {
        println!();
        println!("  {}", story.description);
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
}
