use clap::{Parser, Subcommand};
use medrec_core::config::{
    admin_from_env_value, confirmation_delay_from_env_value, grant_duration_from_env_value,
    text_from_env_value,
};
use medrec_core::constants::{
    DEFAULT_ACCESS_PURPOSE, DEFAULT_CONTENT_DIR, DEFAULT_GRANT_DURATION_DAYS,
    DEFAULT_LEDGER_STATE_FILE, DEFAULT_RECORD_CATEGORY,
};
use medrec_core::{
    AccessRequest, Address, ContentStoreService, CoreConfig, DevLedger, MedRecClient, NewPatient,
    NewProvider, OperationStatus, RequestStatus, Role, UploadFile,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "medrec")]
#[command(about = "MedRec medical records ledger CLI")]
struct Cli {
    /// Ledger state file (default: MEDREC_LEDGER_STATE or ledger.yaml)
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,
    /// Content store directory (default: MEDREC_CONTENT_DIR or content_store)
    #[arg(long, global = true)]
    content_dir: Option<PathBuf>,
    /// Identity to act as (default: MEDREC_IDENTITY)
    #[arg(long = "as", global = true)]
    identity: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the identity as a patient
    RegisterPatient {
        did: String,
        name: String,
        /// Date of birth (YYYY-MM-DD)
        date_of_birth: String,
        medical_profile: String,
    },
    /// List registered patients
    Patients,
    /// Show a patient's profile
    Patient { address: String },
    /// Upload a file as a new record
    Upload {
        file: PathBuf,
        /// Record id (default: next free numeric id)
        #[arg(long)]
        record_id: Option<String>,
    },
    /// List the identity's records
    Records,
    /// Show the next proposed record id
    NextId,
    /// Request access to a patient's record
    RequestAccess { patient: String, record_id: String },
    /// List access requests involving the identity
    Requests,
    /// Grant an access request
    Grant {
        request_id: u64,
        /// Grant duration in days; defaults to MEDREC_GRANT_DURATION_DAYS
        #[arg(long)]
        days: Option<u32>,
    },
    /// Deny an access request
    Deny { request_id: u64 },
    /// Register the identity as a provider
    RegisterProvider {
        did: String,
        name: String,
        role: String,
        #[arg(long)]
        license_id: Option<String>,
        #[arg(long)]
        hospital: Option<String>,
    },
    /// Verify a provider (admin only)
    VerifyProvider { address: String },
    /// Print the audit log
    Audit,
}

/// Builds the core configuration from CLI flags and the environment.
fn resolve_config(cli: &Cli) -> Result<CoreConfig, Box<dyn std::error::Error>> {
    let ledger_state = cli
        .ledger
        .clone()
        .or_else(|| std::env::var("MEDREC_LEDGER_STATE").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_STATE_FILE));
    let content_dir = cli
        .content_dir
        .clone()
        .or_else(|| std::env::var("MEDREC_CONTENT_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_DIR));

    let cfg = CoreConfig::new(
        text_from_env_value(
            std::env::var("MEDREC_RECORD_CATEGORY").ok(),
            DEFAULT_RECORD_CATEGORY,
        )?,
        text_from_env_value(
            std::env::var("MEDREC_ACCESS_PURPOSE").ok(),
            DEFAULT_ACCESS_PURPOSE,
        )?,
        grant_duration_from_env_value(
            std::env::var("MEDREC_GRANT_DURATION_DAYS").ok(),
            DEFAULT_GRANT_DURATION_DAYS,
        )?,
        content_dir,
    )?
    .with_ledger_state_path(ledger_state)
    .with_confirmation_delay(confirmation_delay_from_env_value(
        std::env::var("MEDREC_CONFIRMATION_DELAY_MS").ok(),
    )?)
    .with_admin(admin_from_env_value(std::env::var("MEDREC_ADMIN").ok())?);

    Ok(cfg)
}

fn resolve_identity(cli: &Cli) -> Result<Option<Address>, Box<dyn std::error::Error>> {
    let value = cli
        .identity
        .clone()
        .or_else(|| std::env::var("MEDREC_IDENTITY").ok())
        .filter(|v| !v.trim().is_empty());
    Ok(value.map(|v| Address::parse(&v)).transpose()?)
}

fn format_time(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn print_request(request: &AccessRequest) {
    let status = match request.status() {
        RequestStatus::Pending => "pending".to_string(),
        RequestStatus::Approved { expires_at } => {
            format!("approved until {}", format_time(expires_at))
        }
        RequestStatus::Rejected => "rejected".to_string(),
    };
    println!(
        "#{} record {} provider {} patient {} requested {} [{}] purpose: {}",
        request.request_id(),
        request.record_id(),
        request.provider(),
        request.patient(),
        format_time(request.request_date()),
        status,
        request.purpose()
    );
}

fn print_status(status: &OperationStatus) {
    if !status.message().is_empty() {
        println!("{}", status.message());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medrec_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command.as_ref() else {
        println!("Use 'medrec --help' for commands");
        return Ok(());
    };

    let cfg = Arc::new(resolve_config(&cli)?);
    let identity = resolve_identity(&cli)?;
    let ledger = DevLedger::open(&cfg, identity.unwrap_or(Address::ZERO))?;

    if let Commands::Audit = command {
        let entries = ledger.audit_log()?;
        if entries.is_empty() {
            println!("No audit entries.");
        }
        for logged in entries {
            println!(
                "{} {} {} by {} record {} target {} info {}",
                logged.sequence,
                format_time(logged.timestamp),
                logged.entry.action,
                logged.entry.actor,
                logged.entry.record_id,
                logged.entry.target,
                logged.entry.info
            );
        }
        return Ok(());
    }

    let identity = identity.ok_or("an identity is required: pass --as or set MEDREC_IDENTITY")?;
    let content = ContentStoreService::new(cfg.content_store_dir())?;
    let client = MedRecClient::new(
        ledger.connect(identity).contracts(Arc::new(content)),
        cfg.clone(),
    );
    let mut session = client.connect(identity);

    match command {
        Commands::RegisterPatient {
            did,
            name,
            date_of_birth,
            medical_profile,
        } => {
            let form = NewPatient {
                did: did.clone(),
                name: name.clone(),
                date_of_birth: date_of_birth.clone(),
                medical_profile: medical_profile.clone(),
            };
            client.register_patient(&mut session, &form).await?;
            print_status(&session.statuses().patient_registration);
        }
        Commands::Patients => {
            let patients = client.directory().fetch_all_patients(&mut session).await?;
            if patients.is_empty() {
                println!("No patients found.");
            }
            for (index, patient) in patients.iter().enumerate() {
                println!("{}: {}", index, patient);
            }
        }
        Commands::Patient { address } => {
            let patient = Address::parse(address)?;
            let profile = client.directory().select_patient(&mut session, patient).await?;
            println!("DID: {}", profile.did);
            println!("Name: {}", profile.name);
            println!(
                "Date of birth: {}",
                chrono::DateTime::from_timestamp(profile.date_of_birth, 0)
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| profile.date_of_birth.to_string())
            );
            println!("Medical profile: {}", profile.medical_profile);
        }
        Commands::Upload { file, record_id } => {
            let bytes = std::fs::read(file)?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            client.enter_role(&mut session, Role::Patient).await?;
            if let Some(record_id) = record_id {
                session.set_auto_record_id(false);
                session.set_record_id(record_id.clone());
            }
            session.select_file(Some(UploadFile::new(name, bytes)));

            let entry = client.records().upload_record(&mut session).await?;
            print_status(&session.statuses().transaction);
            println!("Record {} -> {}", entry.record_id, entry.content_hash);
        }
        Commands::Records => {
            let records = client.records().refresh_my_records(&mut session).await?;
            if records.is_empty() {
                println!("No records found.");
            }
            for record in records {
                println!("{}: {}", record.record_id, record.content_hash);
            }
        }
        Commands::NextId => {
            let next = client.records().suggest_new_record_id(&mut session).await?;
            println!("{}", next);
        }
        Commands::RequestAccess { patient, record_id } => {
            let patient = Address::parse(patient)?;
            if let Err(e) = client.directory().select_patient(&mut session, patient).await {
                tracing::warn!("patient details unavailable: {}", e);
            }
            session.set_access_record_id(record_id.clone());
            client.tracker().request_access(&mut session).await?;
            print_status(&session.statuses().access_request);
        }
        Commands::Requests => {
            let requests = client.tracker().load_requests(&mut session).await?;
            if requests.is_empty() {
                println!("No access requests.");
            }
            for request in &requests {
                print_request(request);
            }
        }
        Commands::Grant { request_id, days } => {
            client.tracker().load_requests(&mut session).await?;
            let days = days.unwrap_or_else(|| session.grant_duration_days());
            client
                .tracker()
                .grant(&mut session, *request_id, days)
                .await?;
            print_status(&session.statuses().transaction);
            for request in session.requests() {
                print_request(request);
            }
        }
        Commands::Deny { request_id } => {
            client.tracker().load_requests(&mut session).await?;
            client.tracker().deny(&mut session, *request_id).await?;
            print_status(&session.statuses().transaction);
            for request in session.requests() {
                print_request(request);
            }
        }
        Commands::RegisterProvider {
            did,
            name,
            role,
            license_id,
            hospital,
        } => {
            let form = NewProvider {
                did: did.clone(),
                name: name.clone(),
                role: role.clone(),
                license_id: license_id.clone(),
                hospital: hospital.clone(),
            };
            client.directory().register_provider(&mut session, &form).await?;
            print_status(&session.statuses().provider_registration);
        }
        Commands::VerifyProvider { address } => {
            client.directory().verify_provider(&mut session, address).await?;
            print_status(&session.statuses().provider_verification);
        }
        Commands::Audit => {}
    }

    Ok(())
}
