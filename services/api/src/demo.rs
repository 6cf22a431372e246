use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde_json::json;

use crate::infra::{InMemoryRecordService, StubDocumentService};
use admission_flow::error::AppError;
use admission_flow::workflows::application::{
    ApplicationStepService, ExtractionConfig, ExtractionNotifier, ExtractionOutcome,
    NullDraftPersistence, SectionRecord, TokioPollTimer, UploadedFile, SECTIONS,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Delay between extraction status polls, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub(crate) poll_delay_ms: u64,
    /// Number of "still pending" polls before the stub recognizer resolves
    #[arg(long, default_value_t = 2)]
    pub(crate) pending_polls: u32,
    /// Skip the document extraction portion of the demo
    #[arg(long)]
    pub(crate) skip_extraction: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            poll_delay_ms: 100,
            pending_polls: 2,
            skip_extraction: false,
        }
    }
}

struct PrintlnNotifier;

impl ExtractionNotifier for PrintlnNotifier {
    fn fields_populated(&self, section: usize, count: usize) {
        println!("  [autofill] section {section}: {count} fields populated from the document");
    }
}

fn demo_file(name: &str) -> UploadedFile {
    let mime_type = mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    UploadedFile::new(name, mime_type, vec![0x25, 0x50, 0x44, 0x46, 0x2d])
}

fn record(entries: &[(&str, serde_json::Value)]) -> SectionRecord {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        poll_delay_ms,
        pending_polls,
        skip_extraction,
    } = args;

    println!("Admission application intake demo");

    let records = Arc::new(InMemoryRecordService::default());
    let documents = Arc::new(StubDocumentService::new(pending_polls));
    let service = ApplicationStepService::with_parts(
        records.clone(),
        documents,
        Arc::new(TokioPollTimer),
        Arc::new(PrintlnNotifier),
        Arc::new(NullDraftPersistence),
        ExtractionConfig {
            poll_delay: Duration::from_millis(poll_delay_ms),
            ..ExtractionConfig::default()
        },
    );

    service.begin_create();
    println!("- New application started (create mode, section 0 of 14)");

    // The applicant types a couple of fields, then the step order gate is
    // demonstrated before anything else is filled in.
    service
        .set_section(0, record(&[("given_name", json!("Jane"))]))
        .map_err(AppError::from)?;
    if let Err(err) = service.go_to_step(5) {
        println!("- Jumping ahead is rejected while section 0 is open: {err}");
    }

    service.complete_step(0).await.map_err(AppError::from)?;
    let application_id = service
        .application_id()
        .map(|id| id.0)
        .unwrap_or_else(|| "unassigned".to_string());
    println!("- Section 0 saved; backend record {application_id} created");

    if !skip_extraction {
        println!("\nDocument extraction");

        // A disallowed file never reaches the recognition service.
        let rejected = service
            .trigger_extraction(0, demo_file("resume.exe"))
            .await;
        if let Err(err) = rejected {
            println!("- resume.exe rejected locally: {err}");
        }

        println!(
            "- Uploading passport.pdf (recognizer stays pending for {pending_polls} polls)"
        );
        let outcome = service
            .trigger_extraction(0, demo_file("passport.pdf"))
            .await
            .map_err(AppError::from)?;
        match outcome {
            ExtractionOutcome::Succeeded { fields_populated } => {
                println!("- Extraction succeeded; {fields_populated} fields auto-filled");
            }
            other => println!("- Extraction ended without a merge: {other:?}"),
        }

        if let Some(section) = service.section(0).map_err(AppError::from)? {
            println!("- Section 0 after the merge (typed values untouched):");
            for (key, value) in &section {
                println!("    {key}: {value}");
            }
        }
    }

    println!("\nRemaining sections");
    for descriptor in SECTIONS.iter().skip(1) {
        service
            .set_section(
                descriptor.index,
                record(&[("summary", json!(format!("{} provided", descriptor.title)))]),
            )
            .map_err(AppError::from)?;
        service
            .complete_step(descriptor.index)
            .await
            .map_err(AppError::from)?;
        if descriptor.index + 1 < SECTIONS.len() {
            service.go_to_next().map_err(AppError::from)?;
        }
    }
    println!(
        "- {} of {} sections completed",
        service.completed_steps().len(),
        SECTIONS.len()
    );

    service.submit().await.map_err(AppError::from)?;
    println!("\nSubmission");
    if let Some(id) = service.application_id() {
        if let Some(stored) = records.stored(&id) {
            println!(
                "- Application {} submitted: {} sections on record, submitted={}",
                id.0,
                stored.sections.len(),
                stored.submitted
            );
        }
    }

    Ok(())
}
