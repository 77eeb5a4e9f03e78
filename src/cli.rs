use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::*;
use tokio::time::Duration;

use crate::ai_provider::ProviderClient;
use crate::cache::{RateLimiter, TtlCache};
use crate::config::Config;
use crate::core::content::{ApprovalStatus, GenerationRequest, SaveOutcome};
use crate::core::error::ContentError;
use crate::core::persona::QuestionnaireResponse;
use crate::core::store::ProfileStore;
use crate::core::template::{rank_for_persona, TemplateDefinition};
use crate::derivation::{derive_persona, SubmittedAnswer};
use crate::generator::{ContentGenerator, DEFAULT_MAX_LENGTH, DEFAULT_VARIATIONS};
use crate::scoring;

#[derive(Parser)]
#[command(name = "artigen", about = "Persona-driven social media content generation for artists")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the data directory (config and database location)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build or inspect an artist's persona
    Persona {
        #[command(subcommand)]
        command: PersonaCommands,
    },
    /// Manage content templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Generate scored content variations for an artist
    Generate {
        /// Artist identifier
        #[arg(short, long)]
        artist: String,
        /// Kind of copy to produce (social_post, announcement, bio, caption, ...)
        #[arg(short = 't', long, default_value = "social_post")]
        content_type: String,
        /// What the content should be about
        #[arg(short, long)]
        context: Option<String>,
        /// Name of a registered template to use as a draft
        #[arg(long)]
        template: Option<String>,
        /// How many variations to produce (capped at 5)
        #[arg(short = 'n', long, default_value_t = DEFAULT_VARIATIONS)]
        variations: u32,
        /// Maximum output length passed to the backend
        #[arg(long, default_value_t = DEFAULT_MAX_LENGTH)]
        max_length: u32,
        /// Backend provider (openai or ollama); defaults to the configured one
        #[arg(long)]
        provider: Option<String>,
        /// Model override for the chosen provider
        #[arg(long)]
        model: Option<String>,
    },
    /// Score a piece of text against an artist's persona
    Score {
        #[arg(short, long)]
        artist: String,
        text: String,
    },
    /// List and review generated content
    Content {
        #[command(subcommand)]
        command: ContentCommands,
    },
}

#[derive(Subcommand)]
pub enum PersonaCommands {
    /// Submit questionnaire answers (JSON file) and derive the persona
    Submit {
        #[arg(short, long)]
        artist: String,
        /// JSON array of {key, question, answer, type} objects
        answers: PathBuf,
    },
    /// Show the active persona and its questionnaire answers
    Show {
        #[arg(short, long)]
        artist: String,
    },
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Register (or overwrite) a template from a JSON definition file
    Register { file: PathBuf },
    /// List active templates
    List {
        #[arg(short = 't', long)]
        content_type: Option<String>,
    },
    /// Show one template with its variables
    Show { name: String },
    /// Substitute variables (JSON object) into a template and print it
    Render {
        name: String,
        #[arg(long)]
        vars: Option<String>,
    },
    /// Suggest templates for a content type, ranked for an artist's persona
    Suggest {
        #[arg(short = 't', long, default_value = "social_post")]
        content_type: String,
        #[arg(short, long)]
        artist: Option<String>,
    },
    /// Deactivate a template (soft delete)
    Remove { name: String },
}

#[derive(Subcommand)]
pub enum ContentCommands {
    /// List stored variations for an artist, newest first
    List {
        #[arg(short, long)]
        artist: String,
    },
    /// Approve a variation
    Approve { id: String },
    /// Reject a variation
    Reject { id: String },
}

pub async fn run(args: Args) -> Result<()> {
    let data_dir = args.data_dir;
    match args.command {
        Commands::Persona { command } => match command {
            PersonaCommands::Submit { artist, answers } => {
                handle_persona_submit(data_dir, artist, answers)
            }
            PersonaCommands::Show { artist } => handle_persona_show(data_dir, artist),
        },
        Commands::Template { command } => match command {
            TemplateCommands::Register { file } => handle_template_register(data_dir, file),
            TemplateCommands::List { content_type } => {
                handle_template_list(data_dir, content_type)
            }
            TemplateCommands::Show { name } => handle_template_show(data_dir, name),
            TemplateCommands::Render { name, vars } => handle_template_render(data_dir, name, vars),
            TemplateCommands::Suggest {
                content_type,
                artist,
            } => handle_template_suggest(data_dir, content_type, artist),
            TemplateCommands::Remove { name } => handle_template_remove(data_dir, name),
        },
        Commands::Generate {
            artist,
            content_type,
            context,
            template,
            variations,
            max_length,
            provider,
            model,
        } => {
            handle_generate(
                data_dir,
                artist,
                content_type,
                context,
                template,
                variations,
                max_length,
                provider,
                model,
            )
            .await
        }
        Commands::Score { artist, text } => handle_score(data_dir, artist, text),
        Commands::Content { command } => match command {
            ContentCommands::List { artist } => handle_content_list(data_dir, artist),
            ContentCommands::Approve { id } => {
                handle_content_review(data_dir, id, ApprovalStatus::Approved)
            }
            ContentCommands::Reject { id } => {
                handle_content_review(data_dir, id, ApprovalStatus::Rejected)
            }
        },
    }
}

fn open_store(data_dir: Option<PathBuf>) -> Result<(Config, ProfileStore)> {
    let config = Config::new(data_dir)?;
    let store = ProfileStore::new(config.db_path())?;
    Ok((config, store))
}

fn require_persona(
    store: &ProfileStore,
    artist: &str,
) -> Result<crate::core::persona::PersonaWithResponses> {
    Ok(store.active_persona(artist)?.ok_or_else(|| {
        ContentError::NotFound(format!("active persona for artist '{}'", artist))
    })?)
}

fn handle_persona_submit(data_dir: Option<PathBuf>, artist: String, answers: PathBuf) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;

    let raw = std::fs::read_to_string(&answers)?;
    let answers: Vec<SubmittedAnswer> = serde_json::from_str(&raw)?;

    let existing = store.active_persona(&artist)?;
    let persona = derive_persona(&artist, existing.as_ref().map(|p| &p.persona), &answers);
    store.upsert_persona(&persona)?;

    let now = Utc::now();
    for answer in &answers {
        store.upsert_response(&QuestionnaireResponse {
            persona_id: persona.id.clone(),
            question_key: answer.key.clone(),
            question: answer.question.clone(),
            answer: answer.answer.clone(),
            answer_type: answer.answer_type,
            updated_at: now,
        })?;
    }

    let verb = if existing.is_some() { "Updated" } else { "Created" };
    println!("{} persona for {}", verb.green(), artist.cyan());
    print_persona_summary(&persona);
    Ok(())
}

fn handle_persona_show(data_dir: Option<PathBuf>, artist: String) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    let persona = require_persona(&store, &artist)?;

    print_persona_summary(&persona.persona);
    if !persona.responses.is_empty() {
        println!();
        println!("{}", "Questionnaire".cyan().bold());
        for response in &persona.responses {
            println!("  {}: {}", response.question_key.bold(), response.answer);
        }
    }
    Ok(())
}

fn print_persona_summary(persona: &crate::core::persona::Persona) {
    println!("{}: {}", "Name".cyan(), persona.name);
    println!("{}: {}", "Tone".cyan(), persona.tone);
    println!("{}: {}", "Audience".cyan(), persona.target_audience);
    if !persona.themes.is_empty() {
        println!("{}: {}", "Themes".cyan(), persona.themes.join(", "));
    }
    for (trait_name, value) in &persona.voice_traits {
        println!("{}: {}", trait_name.cyan(), value);
    }
}

fn handle_template_register(data_dir: Option<PathBuf>, file: PathBuf) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;

    let raw = std::fs::read_to_string(&file)?;
    let definition: TemplateDefinition = serde_json::from_str(&raw)?;
    let stored = store.register_template(&definition.into_template())?;

    println!(
        "{} template {} ({})",
        "Registered".green(),
        stored.name.cyan(),
        stored.content_type
    );
    Ok(())
}

fn handle_template_list(data_dir: Option<PathBuf>, content_type: Option<String>) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    let templates = store.list_templates(content_type.as_deref())?;

    if templates.is_empty() {
        println!("{}", "No templates registered".yellow());
        return Ok(());
    }
    for template in templates {
        let variables: Vec<&str> = template.variables.iter().map(|v| v.name.as_str()).collect();
        println!(
            "{} [{}] variables: {}",
            template.name.cyan().bold(),
            template.content_type,
            variables.join(", ")
        );
    }
    Ok(())
}

fn handle_template_show(data_dir: Option<PathBuf>, name: String) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    let template = store
        .template_by_name(&name)?
        .ok_or_else(|| ContentError::NotFound(format!("template '{}'", name)))?;

    println!("{}: {}", "Name".cyan(), template.name);
    println!("{}: {}", "Type".cyan(), template.content_type);
    if let Some(description) = &template.description {
        println!("{}: {}", "Description".cyan(), description);
    }
    println!("{}", "Variables".cyan());
    for variable in &template.variables {
        let required = if variable.required { "required" } else { "optional" };
        println!("  {} ({}, {})", variable.name.bold(), variable.var_type, required);
    }
    println!("{}", "Body".cyan());
    println!("{}", template.body);
    Ok(())
}

fn handle_template_render(
    data_dir: Option<PathBuf>,
    name: String,
    vars: Option<String>,
) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    let template = store
        .template_by_name(&name)?
        .ok_or_else(|| ContentError::NotFound(format!("template '{}'", name)))?;

    let mut values: HashMap<String, String> = HashMap::new();
    if let Some(vars) = vars {
        let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&vars)?;
        for (key, value) in parsed {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            values.insert(key, value);
        }
    }

    println!("{}", template.substitute(&values)?);
    Ok(())
}

fn handle_template_suggest(
    data_dir: Option<PathBuf>,
    content_type: String,
    artist: Option<String>,
) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    let templates = store.list_templates(Some(&content_type))?;

    let persona = match artist {
        Some(artist) => Some(require_persona(&store, &artist)?.persona),
        None => None,
    };
    let ranked = rank_for_persona(templates, persona.as_ref());

    if ranked.is_empty() {
        println!("{}", format!("No templates for content type '{}'", content_type).yellow());
        return Ok(());
    }
    for (rank, template) in ranked.iter().enumerate() {
        let description = template.description.as_deref().unwrap_or("");
        println!("{} {} {}", format!("{}.", rank + 1).bold(), template.name.cyan(), description);
    }
    Ok(())
}

fn handle_template_remove(data_dir: Option<PathBuf>, name: String) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    store.deactivate_template(&name)?;
    println!("{} template {}", "Deactivated".yellow(), name.cyan());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_generate(
    data_dir: Option<PathBuf>,
    artist: String,
    content_type: String,
    context: Option<String>,
    template: Option<String>,
    variations: u32,
    max_length: u32,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let (config, store) = open_store(data_dir)?;
    let persona = require_persona(&store, &artist)?;

    let backend = ProviderClient::new(config.backend_config(provider, model)?)?;
    let cache = TtlCache::new(Duration::from_secs(config.generation.cache_ttl_secs));
    let limiter = RateLimiter::per_minute(config.generation.requests_per_minute);
    let generator = ContentGenerator::new(backend, cache, limiter);

    let request = GenerationRequest {
        content_type,
        context,
        max_length,
        variation_count: variations,
        template,
    };
    let results = generator.generate(&store, &persona, &request).await?;

    if results.is_empty() {
        println!("{}", "No content generated".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "Generated {} variation(s) for {}",
            results.len(),
            persona.persona.name
        )
        .cyan()
        .bold()
    );
    for (rank, variation) in results.iter().enumerate() {
        let quality = &variation.content.quality;
        println!();
        println!(
            "{} {} {}",
            format!("#{}", rank + 1).bold(),
            format!("score {:.2}", quality.overall).green(),
            format!(
                "(read {:.2} / engage {:.2} / brand {:.2})",
                quality.readability, quality.engagement, quality.brand_consistency
            )
            .dimmed()
        );
        println!("{}", variation.content.body);
        for suggestion in &quality.suggestions {
            println!("  {} {}", "hint:".dimmed(), suggestion.dimmed());
        }
        match &variation.save {
            SaveOutcome::Saved { id } => println!("  {} {}", "saved".green(), id.dimmed()),
            SaveOutcome::Failed { error } => {
                println!("  {} {}", "save failed:".red(), error)
            }
        }
    }
    Ok(())
}

fn handle_score(data_dir: Option<PathBuf>, artist: String, text: String) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    let persona = require_persona(&store, &artist)?;

    let metrics = scoring::score(&text, &persona.persona);
    println!("{}: {:.2}", "Overall".cyan().bold(), metrics.overall);
    println!("{}: {:.2}", "Readability".cyan(), metrics.readability);
    println!("{}: {:.2}", "Engagement".cyan(), metrics.engagement);
    println!("{}: {:.2}", "Brand consistency".cyan(), metrics.brand_consistency);
    for issue in &metrics.issues {
        println!("{} {}", "issue:".yellow(), issue);
    }
    for suggestion in &metrics.suggestions {
        println!("{} {}", "hint:".dimmed(), suggestion);
    }
    Ok(())
}

fn handle_content_list(data_dir: Option<PathBuf>, artist: String) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    let persona = require_persona(&store, &artist)?;
    let content = store.list_content(&persona.persona.id)?;

    if content.is_empty() {
        println!("{}", "No generated content yet".yellow());
        return Ok(());
    }
    for item in content {
        let status = match item.status {
            ApprovalStatus::Draft => "draft".yellow(),
            ApprovalStatus::Approved => "approved".green(),
            ApprovalStatus::Rejected => "rejected".red(),
        };
        println!(
            "{} [{}] {:.2} {}",
            item.id.dimmed(),
            status,
            item.quality.overall,
            item.body
        );
    }
    Ok(())
}

fn handle_content_review(data_dir: Option<PathBuf>, id: String, status: ApprovalStatus) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    store.update_content_status(&id, status)?;
    println!("{} {} as {}", "Marked".green(), id.dimmed(), status);
    Ok(())
}
