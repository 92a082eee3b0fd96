//! Migration orchestrator - main workflow coordinator.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, LegacyTablesConfig, StoreConfig};
use crate::context::RunContext;
use crate::crosswalk::{build_doctor_crosswalk, existing_doctors, Crosswalk, DoctorCrosswalk};
use crate::dump::{
    DumpReader, FromLegacyRow, LegacyAppointment, LegacyCharge, LegacyDoctor, LegacyPatient,
    ParseStats,
};
use crate::error::Result;
use crate::loader::{LinkStats, LoadStats, Loader};
use crate::model::{Appointment, Bill, Patient, ServiceItem};
use crate::report::{MigrationReport, RunStatus, TransformSummary};
use crate::store::{self, DocumentStore};
use crate::transform::{
    dedupe_service_items, transform_appointment, transform_charge, transform_patient,
    TransformContext,
};

/// Typed contents of the four legacy tables.
#[derive(Debug, Clone, Default)]
pub struct ParsedDump {
    pub patients: Vec<LegacyPatient>,
    pub appointments: Vec<LegacyAppointment>,
    pub charges: Vec<LegacyCharge>,
    pub doctors: Vec<LegacyDoctor>,
    pub stats: BTreeMap<String, ParseStats>,
}

impl ParsedDump {
    /// Scan every legacy table of `dump`.
    pub fn read(dump: &DumpReader, tables: &LegacyTablesConfig) -> Result<Self> {
        let mut stats = BTreeMap::new();
        Ok(Self {
            patients: read_into(dump, &tables.patients, &mut stats)?,
            appointments: read_into(dump, &tables.appointments, &mut stats)?,
            charges: read_into(dump, &tables.charges, &mut stats)?,
            doctors: read_into(dump, &tables.doctors, &mut stats)?,
            stats,
        })
    }
}

fn read_into<T: FromLegacyRow>(
    dump: &DumpReader,
    table: &str,
    stats: &mut BTreeMap<String, ParseStats>,
) -> Result<Vec<T>> {
    let (records, table_stats) = dump.read_table::<T>(table)?;
    stats.insert(table.to_string(), table_stats);
    Ok(records)
}

/// Target records produced from one dump.
#[derive(Debug, Clone, Default)]
pub struct Transformed {
    pub patients: Vec<Patient>,
    pub appointments: Vec<Appointment>,
    pub bills: Vec<Bill>,
    pub service_items: Vec<ServiceItem>,
    pub summary: TransformSummary,
}

/// Run every transformer over a parsed dump.
pub fn transform_all(parsed: &ParsedDump, ctx: &TransformContext) -> Transformed {
    let patients: Vec<Patient> = parsed
        .patients
        .iter()
        .map(|row| transform_patient(row, ctx))
        .collect();

    let mut appointments = Vec::with_capacity(parsed.appointments.len());
    let mut bills = Vec::new();
    for row in &parsed.appointments {
        let (appointment, bill) = transform_appointment(row, ctx);
        appointments.push(appointment);
        bills.extend(bill);
    }

    let items: Vec<ServiceItem> = parsed
        .charges
        .iter()
        .filter_map(|row| transform_charge(row, ctx))
        .collect();
    let charges_without_name = parsed.charges.len() - items.len();
    let (service_items, duplicate_service_items) = dedupe_service_items(items);

    let summary = TransformSummary {
        patients: patients.len(),
        appointments: appointments.len(),
        bills: bills.len(),
        service_items: service_items.len(),
        duplicate_service_items,
        charges_without_name,
    };
    info!(
        patients = summary.patients,
        appointments = summary.appointments,
        bills = summary.bills,
        service_items = summary.service_items,
        duplicate_service_items,
        "Transformed legacy records"
    );

    Transformed {
        patients,
        appointments,
        bills,
        service_items,
        summary,
    }
}

/// Store connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub store_type: String,
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub healthy: bool,
}

/// Migration orchestrator.
pub struct Migrator {
    config: Config,
    store: Arc<dyn DocumentStore>,
    cancel: CancellationToken,
}

impl Migrator {
    /// Create a migrator over an already opened store.
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Validate the configuration and open the store.
    pub async fn connect(config: Config, store_config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        store_config.validate()?;
        let store = store::connect(store_config).await?;
        Ok(Self::new(config, store))
    }

    /// Cancel between phases and chunks once `token` fires.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    fn loader(&self) -> Loader<'_> {
        Loader::new(
            self.store.as_ref(),
            self.config.migration.get_chunk_size(),
            self.cancel.clone(),
        )
    }

    /// Parse → transform → crosswalks → load patients, appointments, bills,
    /// service items → link. A dry run stops after planning.
    pub async fn run(&self, dump: &Path, dry_run: bool) -> Result<MigrationReport> {
        let reader = DumpReader::open(dump)?;
        let mut ctx = RunContext::new(&self.config, self.cancel.clone());
        let cols = &self.config.collections;
        let started = Instant::now();

        info!("Starting migration run: {}", ctx.run_id);

        // Phase 1: Parse
        info!("Phase 1: Parsing legacy dump {}", reader.path().display());
        let parsed = ParsedDump::read(&reader, &self.config.tables)?;
        ctx.check_cancelled()?;

        // Phase 2: Transform
        info!("Phase 2: Transforming records");
        let Transformed {
            patients,
            mut appointments,
            mut bills,
            service_items,
            summary,
        } = transform_all(&parsed, &ctx.transform);
        ctx.check_cancelled()?;

        // Phase 3: Crosswalks
        info!("Phase 3: Building crosswalks");
        ctx.patients = Crosswalk::from_store(self.store(), &cols.patients).await?;
        ctx.doctors = Some(self.doctor_crosswalk(&parsed.doctors).await?);
        let doctor_report = ctx
            .doctors
            .as_ref()
            .map(|d| d.report.clone())
            .unwrap_or_default();

        let loader = self.loader();
        let mut loads: Vec<LoadStats> = Vec::with_capacity(4);

        if dry_run {
            info!("Dry run: planning inserts without writing");
            loads.push(loader.plan(&cols.patients, patients).await?.stats);
            loads.push(loader.plan(&cols.appointments, appointments).await?.stats);
            loads.push(loader.plan(&cols.bills, bills).await?.stats);
            loads.push(loader.plan(&cols.service_items, service_items).await?.stats);
            return Ok(self.report(
                &ctx,
                started,
                dump,
                parsed.stats,
                summary,
                loads,
                vec![],
                doctor_report,
                RunStatus::DryRun,
            ));
        }

        // Phase 4: Patients
        info!("Phase 4: Loading patients");
        let outcome = loader.load(&cols.patients, patients).await?;
        ctx.patients.extend(&outcome.assigned);
        loads.push(outcome.stats);
        ctx.check_cancelled()?;

        // Phase 5: Appointments, references resolved once
        info!("Phase 5: Loading appointments");
        for appointment in &mut appointments {
            appointment.patient = ctx.resolve_patient(appointment.legacy_patient_id);
            appointment.doctor = ctx.resolve_doctor(appointment.legacy_doctor_id);
        }
        let outcome = loader.load(&cols.appointments, appointments).await?;
        ctx.appointments.extend(&outcome.assigned);
        loads.push(outcome.stats);
        ctx.check_cancelled()?;

        // Phase 6: Bills copy their owning appointment's references
        info!("Phase 6: Loading bills");
        let owners = loader.appointment_refs(&cols.appointments).await?;
        for bill in &mut bills {
            if let Some(owner) = owners.get(&bill.legacy_appointment_id) {
                bill.appointment = Some(owner.id.clone());
                bill.patient = owner.patient.clone();
                bill.doctor = owner.doctor.clone();
            }
        }
        let outcome = loader.load(&cols.bills, bills).await?;
        loads.push(outcome.stats);
        ctx.check_cancelled()?;

        // Phase 7: Service items
        info!("Phase 7: Loading service items");
        let outcome = loader.load(&cols.service_items, service_items).await?;
        loads.push(outcome.stats);
        ctx.check_cancelled()?;

        // Phase 8: Link
        info!("Phase 8: Linking unresolved references");
        let doctors = ctx.doctors.as_ref().map(|d| &d.crosswalk);
        let links = self.link_with(&loader, &ctx.patients, doctors).await?;

        Ok(self.report(
            &ctx,
            started,
            dump,
            parsed.stats,
            summary,
            loads,
            links,
            doctor_report,
            RunStatus::Completed,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        ctx: &RunContext,
        started: Instant,
        dump: &Path,
        parse: BTreeMap<String, ParseStats>,
        transform: TransformSummary,
        loads: Vec<LoadStats>,
        links: Vec<LinkStats>,
        doctors: crate::crosswalk::DoctorMatchReport,
        status: RunStatus,
    ) -> MigrationReport {
        let report = MigrationReport {
            run_id: ctx.run_id.clone(),
            status,
            started_at: ctx.started_at,
            completed_at: Utc::now(),
            duration_seconds: started.elapsed().as_secs_f64(),
            config_hash: self.config.hash(),
            dump: dump.display().to_string(),
            store: self.store.store_type().to_string(),
            parse,
            transform,
            loads,
            links,
            doctors,
        };
        info!(
            run_id = %report.run_id,
            inserted = report.total_inserted(),
            skipped = report.total_skipped(),
            not_found = report.total_not_found(),
            "Migration run finished in {:.2}s",
            report.duration_seconds
        );
        report
    }

    async fn doctor_crosswalk(&self, legacy: &[LegacyDoctor]) -> Result<DoctorCrosswalk> {
        let existing = existing_doctors(self.store(), &self.config.collections.doctors).await?;
        if existing.is_empty() {
            warn!("No doctors in the target store; doctor references stay unresolved");
        }
        Ok(build_doctor_crosswalk(&existing, legacy, &self.config.doctors))
    }

    async fn link_with(
        &self,
        loader: &Loader<'_>,
        patients: &Crosswalk,
        doctors: Option<&Crosswalk>,
    ) -> Result<Vec<LinkStats>> {
        let cols = &self.config.collections;
        let mut links = Vec::with_capacity(3);
        links.push(
            loader
                .link_field(&cols.appointments, "legacyPatientId", "patient", patients)
                .await?,
        );
        if let Some(doctors) = doctors {
            links.push(
                loader
                    .link_field(&cols.appointments, "legacyDoctorId", "doctor", doctors)
                    .await?,
            );
        }
        links.push(loader.link_bills(&cols.bills, &cols.appointments).await?);
        Ok(links)
    }

    /// Rerun only the link step against the current store contents.
    ///
    /// A dump, when given, supplies legacy doctor names for matching.
    pub async fn link(&self, dump: Option<&Path>) -> Result<Vec<LinkStats>> {
        let legacy_doctors = match dump {
            Some(path) => {
                let reader = DumpReader::open(path)?;
                reader
                    .read_table::<LegacyDoctor>(&self.config.tables.doctors)?
                    .0
            }
            None => Vec::new(),
        };

        info!("Rebuilding crosswalks from store");
        let patients =
            Crosswalk::from_store(self.store(), &self.config.collections.patients).await?;
        let doctors = self.doctor_crosswalk(&legacy_doctors).await?;
        let loader = self.loader();
        self.link_with(&loader, &patients, Some(&doctors.crosswalk))
            .await
    }

    /// Check store connectivity.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let outcome = self.store.ping().await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let error = outcome.err().map(|e| e.to_string());
        let connected = error.is_none();
        Ok(HealthCheckResult {
            store_type: self.store.store_type().to_string(),
            connected,
            latency_ms,
            error,
            healthy: connected,
        })
    }
}
