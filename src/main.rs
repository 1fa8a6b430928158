use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use jobtrack::backup::default_backup_file_name;
use jobtrack::config::Config;
use jobtrack::jobs::job_keywords;
use jobtrack::{
    Company, CompanyNames, Database, Job, JobStatus, Person, Profile, SortDirection, SortField,
    SortSpec,
};

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Track job applications, companies, contacts and resume profiles")]
struct Cli {
    /// Database file (defaults to $JOBTRACK_DB or the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its stores
    Init,

    /// Manage companies
    Company {
        #[command(subcommand)]
        command: CompanyCommands,
    },

    /// Manage resume profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Manage contacts
    Person {
        #[command(subcommand)]
        command: PersonCommands,
    },

    /// Manage jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Show how many jobs sit in each status
    Board,

    /// Write every record to a JSON backup
    Export {
        /// Output file (defaults to jobtrack-backup-<date>.json)
        path: Option<PathBuf>,
    },

    /// Replace every record with the contents of a JSON backup
    Import {
        /// Backup file
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum CompanyCommands {
    /// Add a company
    Add {
        name: String,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        linkedin: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// List companies
    List,

    /// Show a company and its jobs
    Show {
        /// Company name or ID
        name: String,
    },

    /// Rename a company
    Rename { id: i64, name: String },

    /// Delete a company (its jobs are kept)
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Add a resume profile
    Add {
        /// Name for this profile
        name: String,

        /// Path to resume file
        file: PathBuf,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List profiles
    List,

    /// Show a profile
    Show { id: i64 },

    /// Delete a profile, unlinking its jobs first
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum PersonCommands {
    /// Add a contact
    Add {
        #[arg(long)]
        first: Option<String>,
        #[arg(long)]
        last: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        linkedin: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// List contacts
    List {
        /// Only contacts at this company
        #[arg(short, long)]
        company: Option<String>,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Add a job posting
    Add {
        title: String,

        /// Company name (created if new)
        #[arg(short, long)]
        company: Option<String>,

        #[arg(short, long, default_value = "Bookmarked")]
        status: JobStatus,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        salary: Option<f64>,

        #[arg(long)]
        url: Option<String>,

        /// File holding the posting text
        #[arg(long)]
        description_file: Option<PathBuf>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Show job details
    Show { id: i64 },

    /// List one status column, a page at a time
    List {
        #[arg(short, long, default_value = "Bookmarked")]
        status: JobStatus,

        /// title, company, location, salary, match_percentage, status, created_at
        #[arg(long, default_value = "created_at")]
        sort: SortField,

        /// ASC or DESC
        #[arg(long, default_value = "DESC")]
        order: SortDirection,

        #[arg(short, long, default_value = "1")]
        page: usize,

        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Move a job to another status
    Move { id: i64, status: JobStatus },

    /// Link a job to a profile, or unlink it when no profile is given
    Link {
        id: i64,
        #[arg(short, long)]
        profile: Option<i64>,
    },

    /// Delete a job
    Delete { id: i64 },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let page_size = match &cli.command {
        Commands::Job {
            command: JobCommands::List { page_size, .. },
        } => *page_size,
        _ => None,
    };
    let config = Config::resolve(cli.db.as_deref(), page_size);
    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;

    match cli.command {
        Commands::Init => {
            let report = db.ensure_schema()?;
            println!(
                "Database ready at {} (schema v{})",
                config.db_path.display(),
                report.version
            );
        }

        Commands::Company { command } => run_company(&db, command)?,
        Commands::Profile { command } => run_profile(&db, command)?,
        Commands::Person { command } => run_person(&db, command)?,
        Commands::Job { command } => run_job(&db, &config, command)?,

        Commands::Board => {
            println!("{:<14} {:>6}", "STATUS", "JOBS");
            println!("{}", "-".repeat(21));
            for (status, count) in db.status_counts()? {
                println!("{:<14} {:>6}", status, count);
            }
        }

        Commands::Export { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(default_backup_file_name()));
            let written = db.export_to_file(&path)?;
            println!("Exported {} record(s) to {}", written, path.display());
        }

        Commands::Import { path } => {
            let report = db
                .import_from_file(&path)
                .with_context(|| format!("Failed to import {}", path.display()))?;
            println!(
                "Imported {} companies, {} profiles, {} people, {} jobs",
                report.companies, report.profiles, report.people, report.jobs
            );
            if !report.skipped.is_empty() {
                println!("Skipped {} record(s):", report.skipped.len());
                for err in &report.skipped {
                    println!("  {}", err);
                }
            }
        }
    }

    Ok(())
}

fn run_company(db: &Database, command: CompanyCommands) -> Result<()> {
    let mut names = CompanyNames::load(db)?;
    match command {
        CompanyCommands::Add {
            name,
            industry,
            location,
            website,
            linkedin,
            notes,
        } => {
            let company = Company {
                id: None,
                name,
                industry,
                location,
                website,
                linkedin,
                notes,
            };
            let id = db.create_company(&company)?;
            println!("Added company #{}", id);
        }

        CompanyCommands::List => {
            let companies = db.list_companies()?;
            if companies.is_empty() {
                println!("No companies found.");
            } else {
                println!("{:<6} {:<30} {:<20} {:<20}", "ID", "NAME", "INDUSTRY", "LOCATION");
                println!("{}", "-".repeat(78));
                for company in companies {
                    println!(
                        "{:<6} {:<30} {:<20} {:<20}",
                        company.id.unwrap_or_default(),
                        truncate(&company.name, 28),
                        truncate(&company.industry.unwrap_or_default(), 18),
                        truncate(&company.location.unwrap_or_default(), 18)
                    );
                }
            }
        }

        CompanyCommands::Show { name } => {
            let company = match name.parse::<i64>() {
                Ok(id) => db.get_company(id)?,
                Err(_) => db.find_company_by_name(&name)?,
            };
            match company {
                Some(company) => {
                    let id = company.id.unwrap_or_default();
                    println!("Company #{}", id);
                    println!("Name: {}", company.name);
                    for (label, value) in [
                        ("Industry", &company.industry),
                        ("Location", &company.location),
                        ("Website", &company.website),
                        ("LinkedIn", &company.linkedin),
                        ("Notes", &company.notes),
                    ] {
                        if let Some(value) = value {
                            println!("{}: {}", label, value);
                        }
                    }
                    let jobs = db.jobs_for_company(id)?;
                    if !jobs.is_empty() {
                        println!("\nJobs ({}):", jobs.len());
                        for job in jobs {
                            println!("  #{} - {} ({})", job.id.unwrap_or_default(), job.title, job.status);
                        }
                    }
                    let contacts = db.find_people_by_company(&company.name)?;
                    if !contacts.is_empty() {
                        println!("\nContacts ({}):", contacts.len());
                        for person in contacts {
                            println!("  {}", person.full_name());
                        }
                    }
                }
                None => println!("Company '{}' not found.", name),
            }
        }

        CompanyCommands::Rename { id, name } => {
            db.rename_company(id, &name, &mut names)?;
            println!("Renamed company #{} to '{}'.", id, name);
        }

        CompanyCommands::Delete { id } => {
            let orphaned = db.remove_company(id, &mut names)?;
            println!("Deleted company #{}.", id);
            if orphaned > 0 {
                println!("{} job(s) now show as unknown company.", orphaned);
            }
        }
    }
    Ok(())
}

fn run_profile(db: &Database, command: ProfileCommands) -> Result<()> {
    match command {
        ProfileCommands::Add { name, file, notes } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read resume file: {}", file.display()))?;
            let mut profile = Profile::new(&name, content);
            profile.notes = notes;
            let id = db.create_profile(&profile)?;
            println!("Added profile '{}' (ID: {})", name, id);
        }

        ProfileCommands::List => {
            let profiles = db.list_profiles()?;
            if profiles.is_empty() {
                println!("No profiles found.");
            } else {
                println!("{:<6} {:<30} {:<26}", "ID", "NAME", "CREATED");
                println!("{}", "-".repeat(64));
                for profile in profiles {
                    println!(
                        "{:<6} {:<30} {:<26}",
                        profile.id.unwrap_or_default(),
                        truncate(&profile.name, 28),
                        profile.created_at
                    );
                }
            }
        }

        ProfileCommands::Show { id } => match db.get_profile(id)? {
            Some(profile) => {
                println!("Profile '{}' (ID: {})", profile.name, id);
                if let Some(notes) = &profile.notes {
                    println!("Notes: {}", notes);
                }
                println!("Created: {}", profile.created_at);
                let linked = db.jobs_for_profile(id)?;
                println!("Linked jobs: {}", linked.len());
                println!("\n--- Content ---\n{}", profile.content);
            }
            None => println!("Profile #{} not found.", id),
        },

        ProfileCommands::Delete { id } => {
            let unlinked = db.delete_profile(id)?;
            println!("Deleted profile #{} ({} job(s) unlinked).", id, unlinked.len());
        }
    }
    Ok(())
}

fn run_person(db: &Database, command: PersonCommands) -> Result<()> {
    match command {
        PersonCommands::Add {
            first,
            last,
            title,
            company,
            email,
            linkedin,
            notes,
        } => {
            let person = Person {
                id: None,
                first_name: first,
                last_name: last,
                job_title: title,
                company_name: company,
                email,
                linkedin,
                notes,
            };
            let id = db.create_person(&person)?;
            println!("Added contact #{}", id);
        }

        PersonCommands::List { company } => {
            let people = match company {
                Some(company) => db.find_people_by_company(&company)?,
                None => db.list_people()?,
            };
            if people.is_empty() {
                println!("No contacts found.");
            } else {
                println!("{:<6} {:<24} {:<20} {:<24}", "ID", "NAME", "COMPANY", "EMAIL");
                println!("{}", "-".repeat(76));
                for person in people {
                    println!(
                        "{:<6} {:<24} {:<20} {:<24}",
                        person.id.unwrap_or_default(),
                        truncate(&person.full_name(), 22),
                        truncate(person.company_name.as_deref().unwrap_or_default(), 18),
                        truncate(person.email.as_deref().unwrap_or_default(), 22)
                    );
                }
            }
        }
    }
    Ok(())
}

fn run_job(db: &Database, config: &Config, command: JobCommands) -> Result<()> {
    let mut names = CompanyNames::load(db)?;
    match command {
        JobCommands::Add {
            title,
            company,
            status,
            location,
            salary,
            url,
            description_file,
            notes,
        } => {
            let description = match description_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let job = Job {
                status,
                location,
                salary,
                url,
                description,
                notes,
                ..Job::new(title)
            };
            let id = db.save_job_with_company(&job, company.as_deref(), &mut names)?;
            println!("Added job #{}", id);
        }

        JobCommands::Show { id } => match db.get_job(id)? {
            Some(job) => print_job(db, &names, &job)?,
            None => println!("Job #{} not found.", id),
        },

        JobCommands::List {
            status,
            sort,
            order,
            page,
            ..
        } => {
            let result = db.job_page(status, SortSpec::new(sort, order), page, config.page_size)?;
            if result.jobs.is_empty() {
                println!("No {} jobs.", status);
            } else {
                println!(
                    "{:<6} {:<30} {:<20} {:<16} {:>10} {:>6}",
                    "ID", "TITLE", "COMPANY", "LOCATION", "SALARY", "MATCH"
                );
                println!("{}", "-".repeat(93));
                for job in &result.jobs {
                    println!(
                        "{:<6} {:<30} {:<20} {:<16} {:>10} {:>6}",
                        job.id.unwrap_or_default(),
                        truncate(&job.title, 28),
                        truncate(names.resolve(job.company_id), 18),
                        truncate(job.location.as_deref().unwrap_or_default(), 14),
                        job.salary.map(|s| format!("{:.0}", s)).unwrap_or_else(|| "-".into()),
                        job.match_percentage
                            .map(|m| format!("{}%", m))
                            .unwrap_or_else(|| "-".into())
                    );
                }
            }
            println!(
                "\n{} {} job(s), page {} of {}",
                result.total, status, result.page, result.total_pages
            );
        }

        JobCommands::Move { id, status } => {
            db.set_job_status(id, status)?;
            println!("Moved job #{} to {}.", id, status);
        }

        JobCommands::Link { id, profile } => {
            db.assign_profile(id, profile)?;
            match profile {
                Some(profile) => println!("Linked job #{} to profile #{}.", id, profile),
                None => println!("Unlinked job #{} from its profile.", id),
            }
        }

        JobCommands::Delete { id } => {
            db.delete_job(id)?;
            println!("Deleted job #{}.", id);
        }
    }
    Ok(())
}

fn print_job(db: &Database, names: &CompanyNames, job: &Job) -> Result<()> {
    let id = job.id.ok_or_else(|| anyhow!("Stored job has no id"))?;
    println!("Job #{}", id);
    println!("Title: {}", job.title);
    println!("Company: {}", names.resolve(job.company_id));
    println!("Status: {}", job.status);
    if let Some(location) = &job.location {
        println!("Location: {}", location);
    }
    if let Some(salary) = job.salary {
        println!("Salary: {:.0}", salary);
    }
    if let Some(url) = &job.url {
        println!("URL: {}", url);
    }
    println!("Created: {}", job.created_at);
    if let Some(profile_id) = job.profile_id {
        let profile = db
            .get_profile(profile_id)?
            .map(|p| p.name)
            .unwrap_or_else(|| format!("#{}", profile_id));
        println!("Profile: {}", profile);
        if let (Some(pct), Some(why)) = (job.match_percentage, &job.match_justification) {
            println!("Match: {}%", pct);
            println!("{}", textwrap::indent(&textwrap::fill(why, 76), "  "));
        }
    }
    if let Some(keywords) = job_keywords(job) {
        if !keywords.mandatory.is_empty() {
            println!("Required: {}", keywords.mandatory.join(", "));
        }
        if !keywords.nice_to_have.is_empty() {
            println!("Nice to have: {}", keywords.nice_to_have.join(", "));
        }
    }
    if let Some(notes) = &job.notes {
        println!("Notes: {}", notes);
    }
    if let Some(description) = &job.description {
        println!("\n--- Description ---\n{}", textwrap::fill(description, 80));
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
