use articles_updates_report::{
    config::{ReportConfig, DEFAULT_AUTOMATION_GROUP, DEFAULT_BULK_EDIT_TEMPLATE},
    dump_parser::DumpParser,
    engine::ReportEngine,
    params::ReportParameters,
    store::InMemoryStore,
};
use clap::Parser;
use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, clap::Parser)]
struct CommandLine {
    /// MediaWiki XML history dump, optionally zstd compressed (`.zst`)
    input_file: PathBuf,
    /// First day of the report (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,
    /// Last day of the report, inclusive (YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,
    /// Only count articles in this category
    #[arg(long)]
    category: Option<String>,
    /// Also list human and bot editors
    #[arg(long)]
    debug: bool,
    /// Group whose members count as bots, may be repeated
    #[arg(long = "automation-group", default_value = DEFAULT_AUTOMATION_GROUP)]
    automation_groups: Vec<String>,
    /// Group membership as USER=GROUP, may be repeated
    #[arg(long = "group-member", value_parser = parse_group_member)]
    group_members: Vec<(String, String)>,
    /// Localized edit summary template of the find/replace tool
    #[arg(long, default_value = DEFAULT_BULK_EDIT_TEMPLATE)]
    bulk_edit_template: String,
}

fn parse_group_member(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((user, group)) if !user.trim().is_empty() && !group.trim().is_empty() => {
            Ok((user.trim().to_owned(), group.trim().to_owned()))
        }
        _ => Err(format!("expected USER=GROUP, got {value:?}")),
    }
}

fn open_dump(path: &Path) -> Result<Box<dyn BufRead>, Box<dyn Error>> {
    let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let reader = BufReader::new(file);
    if path.extension().is_some_and(|ext| ext == "zst") {
        let reader = zstd::stream::Decoder::with_buffer(reader)?;
        Ok(Box::new(BufReader::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

// an unknown user is most likely a typo, which would turn a bot into a human
fn register_group_members(
    store: &mut InMemoryStore,
    members: &[(String, String)],
) -> Result<(), Box<dyn Error>> {
    for (user, group) in members {
        let actor = store.actor_id_by_name(user).ok_or_else(|| {
            format!("--group-member: user {user:?} has no revisions in the dump")
        })?;
        store.add_group_membership(actor, group)?;
    }
    Ok(())
}

fn run(args: CommandLine) -> Result<(), Box<dyn Error>> {
    let params = ReportParameters::from_form(
        args.from.as_deref(),
        args.to.as_deref(),
        args.category.as_deref(),
        args.debug,
    )?;

    let mut parser = DumpParser::new(open_dump(&args.input_file)?)?;
    eprintln!("Site info: {:?}", parser.site_info());

    let mut store = InMemoryStore::new();
    let summary = parser.load_into(&mut store)?;
    eprintln!(
        "Loaded {} pages with {} revisions",
        summary.pages, summary.revisions
    );

    register_group_members(&mut store, &args.group_members)?;

    let config = ReportConfig::default()
        .with_automation_groups(&args.automation_groups)
        .with_bulk_edit_template(args.bulk_edit_template);
    let engine = ReportEngine::new(store, &config)?;

    let outcome = engine.run(&params)?;
    println!("{}", outcome.updated_pages);

    if let Some(editors) = outcome.editors {
        println!("humans ({}):", editors.humans.len());
        for name in &editors.humans {
            println!("  {name}");
        }
        println!("bots ({}):", editors.bots.len());
        for name in &editors.bots {
            println!("  {name}");
        }
    }

    Ok(())
}

fn main() {
    let args: CommandLine = CommandLine::parse();

    if let Err(err) = run(args) {
        eprintln!("error: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use articles_updates_report::{actors::ActorClassifier, config::DEFAULT_AUTOMATION_GROUP};

    fn members(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(user, group)| (user.to_string(), group.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_group_member() {
        assert_eq!(
            parse_group_member(" Bot1 = automaton").unwrap(),
            ("Bot1".to_owned(), "automaton".to_owned())
        );
        assert!(parse_group_member("Bot1").is_err());
        assert!(parse_group_member("=automaton").is_err());
    }

    #[test]
    fn test_register_group_members() {
        let mut store = InMemoryStore::new();
        store.ensure_actor("Bot1", Some(2));

        let bot1 = members(&[("Bot1", DEFAULT_AUTOMATION_GROUP)]);
        register_group_members(&mut store, &bot1).unwrap();
        let classifier = ActorClassifier::new(&ReportConfig::default().automation_groups);
        let bots = classifier.automated_actor_names(&store).unwrap();
        assert!(bots.contains("Bot1"));
    }

    #[test]
    fn test_unknown_group_member_is_an_error() {
        let mut store = InMemoryStore::new();
        store.ensure_actor("Bot1", Some(2));

        let err = register_group_members(&mut store, &members(&[("Bto1", "automaton")]))
            .unwrap_err();
        assert!(err.to_string().contains("Bto1"));
    }
}
