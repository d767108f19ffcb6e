use anyhow::Context;
use cheereading::cli::{Cli, Commands, ConfigAction, IndexAction};
use cheereading::config::Config;
use cheereading::embedding::{
    EmbeddingJob, EmbeddingProvider, FastEmbedProvider, IndexBuilder, VectorIndex,
};
use cheereading::models::Item;
use cheereading::recommend::{Explanation, Recommendation, RecommendationService, ServiceStatus};
use cheereading::storage::{Database, StorageManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Embed { regenerate } => {
            let config = load_config(cli.config)?;
            cmd_embed(&config, regenerate)?;
        }
        Commands::Index { action } => {
            let config = load_config(cli.config)?;
            cmd_index(&config, action)?;
        }
        Commands::Recommend { user, k, json } => {
            let config = load_config(cli.config)?;
            cmd_recommend(&config, user, k, json)?;
        }
        Commands::Similar { text, limit, json } => {
            let config = load_config(cli.config)?;
            cmd_similar(&config, &text, limit, json)?;
        }
        Commands::Feedback { user, item } => {
            let config = load_config(cli.config)?;
            let (database, _) = open_storage(&config)?;
            if database.record_feedback(user, item)? {
                println!("✓ Book {} marked as not interested for user {}", item, user);
            } else {
                println!("Book {} was already marked as not interested", item);
            }
        }
        Commands::Rate {
            user,
            item,
            rating,
            date,
        } => {
            let config = load_config(cli.config)?;
            let (database, _) = open_storage(&config)?;
            let read_date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            database.record_interaction(user, item, rating, read_date)?;
            match rating {
                Some(rating) => println!(
                    "✓ User {} read book {} on {} (rated {})",
                    user, item, read_date, rating
                ),
                None => println!("✓ User {} read book {} on {}", user, item, read_date),
            }
        }
        Commands::Stats => {
            let config = load_config(cli.config)?;
            cmd_stats(&config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose {
        "cheereading=debug"
    } else {
        "cheereading=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn open_storage(config: &Config) -> anyhow::Result<(Arc<Database>, PathBuf)> {
    let data_dir = config.data_dir()?;
    let storage = StorageManager::new(data_dir.clone())
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;
    let (database, index_path) = storage.into_parts(&config.indexing.index_file);
    Ok((Arc::new(database), index_path))
}

fn cmd_embed(config: &Config, regenerate: bool) -> anyhow::Result<()> {
    let (database, _) = open_storage(config)?;

    println!("Loading embedding model {}...", config.embedding.model);
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(
        FastEmbedProvider::new(&config.embedding.model)
            .context("Failed to load the embedding model")?,
    );

    let job = EmbeddingJob::new(provider, database, config.embedding.batch_size);
    let result = job.run(regenerate)?;

    println!("✓ Embedding finished");
    println!("  Processed: {}", result.processed);
    println!("  Failed:    {}", result.failed);
    println!("  Took:      {} ms", result.duration_ms);

    if result.processed > 0 {
        println!("\nRun 'cheereading index build' to refresh the similarity index.");
    }
    Ok(())
}

fn cmd_index(config: &Config, action: IndexAction) -> anyhow::Result<()> {
    let (database, index_path) = open_storage(config)?;

    match action {
        IndexAction::Build => {
            let dimension = FastEmbedProvider::model_dimension(&config.embedding.model);
            let report = IndexBuilder::new(database, index_path, dimension).rebuild()?;

            println!("✓ Index built");
            println!("  Vectors:   {}", report.indexed);
            println!("  Skipped:   {}", report.skipped);
            println!("  Dimension: {}", report.dimension);
            println!("  Path:      {}", report.path.display());
        }
        IndexAction::Info => {
            let index = VectorIndex::load(&index_path).with_context(|| {
                format!(
                    "No usable index at {}; run 'cheereading index build'",
                    index_path.display()
                )
            })?;

            println!("Similarity Index");
            println!("================");
            println!("Path:      {}", index_path.display());
            println!("Vectors:   {}", index.len());
            println!("Dimension: {}", index.dimension());
            println!("Built:     {}", index.built_at().format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    Ok(())
}

fn cmd_recommend(config: &Config, user: i64, k: Option<usize>, json: bool) -> anyhow::Result<()> {
    let (database, _) = open_storage(config)?;
    let service = RecommendationService::from_config(config, Arc::clone(&database))?;

    let k = k.unwrap_or(config.recommendation.default_k);
    let mut recommendation = service.recommend(user, k)?;

    if let ServiceStatus::Unavailable { reason } = service.status() {
        tracing::warn!("Recommendations unavailable: {}", reason);
    }

    // never show an empty shelf
    if recommendation.is_empty() {
        recommendation = Recommendation::new(
            database.random_items(config.recommendation.fallback_size)?,
            Explanation::CatalogSample,
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendation)?);
        return Ok(());
    }

    println!("{}", recommendation.explanation);
    println!();
    print_items(&recommendation.items);
    Ok(())
}

fn cmd_similar(config: &Config, text: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    let (database, _) = open_storage(config)?;
    let service = RecommendationService::from_config(config, database)?;

    let results = service.similar_to_text(text, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        match service.status() {
            ServiceStatus::Unavailable { reason } => {
                println!("{}", Explanation::Preparing);
                println!("  {}", reason);
            }
            _ => println!("No similar books found"),
        }
        return Ok(());
    }

    for (rank, scored) in results.iter().enumerate() {
        println!(
            "{:>3}. {} (distance {:.4})",
            rank + 1,
            scored.item.title,
            scored.distance
        );
        if !scored.item.categories.is_empty() {
            println!("     {}", scored.item.categories.join(", "));
        }
    }
    Ok(())
}

fn print_items(items: &[Item]) {
    if items.is_empty() {
        println!("The catalog is empty");
        return;
    }

    for (rank, item) in items.iter().enumerate() {
        println!("{:>3}. [{}] {}", rank + 1, item.id, item.title);
        if !item.categories.is_empty() {
            println!("     {}", item.categories.join(", "));
        }
    }
}

fn cmd_stats(config: &Config) -> anyhow::Result<()> {
    let (database, index_path) = open_storage(config)?;
    let stats = database.stats()?;

    println!("Cheereading Status");
    println!("==================");
    println!("Books:        {}", stats.item_count);
    println!("  embedded:   {}", stats.embedded_item_count);
    println!("Categories:   {}", stats.category_count);
    println!("Readers:      {}", stats.user_count);
    println!("Readings:     {}", stats.interaction_count);
    println!("Not interested: {}", stats.feedback_count);

    match VectorIndex::load(&index_path) {
        Ok(index) => println!(
            "\nIndex: {} vectors ({}D), built {}",
            index.len(),
            index.dimension(),
            index.built_at().format("%Y-%m-%d %H:%M:%S UTC")
        ),
        Err(e) => println!("\nIndex: unavailable ({})", e),
    }
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            init_config(&path, force)?;
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        println!("Configuration file already exists at: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    Config::default().save(path)?;
    println!("✓ Configuration initialized at: {}", path.display());
    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    Ok(Config::load_or_default(&path)?)
}
