//! Patient and provider directory workflows.

use crate::error::{ClientError, ClientResult, RemoteResult};
use crate::remote::{
    submit_and_confirm, PatientDirectory, PatientProfile, ProviderDirectory,
    ProviderRegistration,
};
use crate::session::Session;
use crate::status::{Operation, OperationStatus};
use crate::validation::{parse_date_of_birth, parse_identity, require};
use futures::future::try_join_all;
use medrec_types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Patient registration form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub did: String,
    pub name: String,
    /// `YYYY-MM-DD`.
    pub date_of_birth: String,
    pub medical_profile: String,
}

/// Provider registration form. Licence and hospital are optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProvider {
    pub did: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub license_id: Option<String>,
    #[serde(default)]
    pub hospital: Option<String>,
}

#[derive(Clone)]
pub struct Directory {
    patients: Arc<dyn PatientDirectory>,
    providers: Arc<dyn ProviderDirectory>,
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory").finish_non_exhaustive()
    }
}

impl Directory {
    pub fn new(patients: Arc<dyn PatientDirectory>, providers: Arc<dyn ProviderDirectory>) -> Self {
        Self {
            patients,
            providers,
        }
    }

    /// Lists every registered patient in registry order.
    ///
    /// On failure the session keeps its previous list.
    pub async fn fetch_all_patients(&self, session: &mut Session) -> ClientResult<Vec<Address>> {
        match self.list_patients().await {
            Ok(addresses) => {
                session.patients = addresses.clone();
                Ok(addresses)
            }
            Err(source) => {
                let err = ClientError::Fetch {
                    what: "patients",
                    source,
                };
                tracing::warn!("{}", err);
                Err(err)
            }
        }
    }

    async fn list_patients(&self) -> RemoteResult<Vec<Address>> {
        let count = self.patients.count().await?;
        try_join_all((0..count).map(|index| self.patients.address_at(index))).await
    }

    /// Fetches a patient profile into the session. On failure the profile is cleared.
    pub async fn fetch_patient_details(
        &self,
        session: &mut Session,
        patient: &Address,
    ) -> ClientResult<PatientProfile> {
        match self.patients.get(patient).await {
            Ok(profile) => {
                session.patient_details = Some(profile.clone());
                Ok(profile)
            }
            Err(source) => {
                session.patient_details = None;
                let err = ClientError::Fetch {
                    what: "patient details",
                    source,
                };
                tracing::warn!("{}", err);
                Err(err)
            }
        }
    }

    /// Selects `patient` and fetches its profile.
    pub async fn select_patient(
        &self,
        session: &mut Session,
        patient: Address,
    ) -> ClientResult<PatientProfile> {
        session.selected_patient = Some(patient);
        self.fetch_patient_details(session, &patient).await
    }

    /// Registers the connected identity as a patient, then refreshes the patient list.
    pub async fn register_patient(
        &self,
        session: &mut Session,
        form: &NewPatient,
    ) -> ClientResult<()> {
        session.require_identity()?;

        let profile = match patient_profile(form) {
            Ok(profile) => profile,
            Err(err) => {
                session.statuses.patient_registration = OperationStatus::failed(&err);
                return Err(err);
            }
        };

        session.statuses.patient_registration =
            OperationStatus::started(Operation::RegisterPatient);

        if let Err(source) = submit_and_confirm(self.patients.register(profile)).await {
            let err = ClientError::remote(Operation::RegisterPatient, source);
            session.statuses.patient_registration = OperationStatus::failed(&err);
            return Err(err);
        }

        tracing::info!("patient {} registered", form.did.trim());
        session.statuses.patient_registration =
            OperationStatus::succeeded(Operation::RegisterPatient);

        if let Err(e) = self.fetch_all_patients(session).await {
            tracing::warn!("patient list refresh after registration failed: {}", e);
        }
        Ok(())
    }

    pub async fn register_provider(
        &self,
        session: &mut Session,
        form: &NewProvider,
    ) -> ClientResult<()> {
        session.require_identity()?;

        let registration = match provider_registration(form) {
            Ok(registration) => registration,
            Err(err) => {
                session.statuses.provider_registration = OperationStatus::failed(&err);
                return Err(err);
            }
        };

        session.statuses.provider_registration =
            OperationStatus::started(Operation::RegisterProvider);

        if let Err(source) = submit_and_confirm(self.providers.register(registration)).await {
            let err = ClientError::remote(Operation::RegisterProvider, source);
            session.statuses.provider_registration = OperationStatus::failed(&err);
            return Err(err);
        }

        tracing::info!("provider {} registered", form.did.trim());
        session.statuses.provider_registration =
            OperationStatus::succeeded(Operation::RegisterProvider);
        Ok(())
    }

    /// Admin workflow: verifies the provider at `provider`.
    ///
    /// The caller is checked against the registry admin before anything is submitted.
    pub async fn verify_provider(&self, session: &mut Session, provider: &str) -> ClientResult<()> {
        let identity = session.require_identity()?;

        let provider = match parse_identity(provider, "Provider address required") {
            Ok(provider) => provider,
            Err(err) => {
                session.statuses.provider_verification = OperationStatus::failed(&err);
                return Err(err);
            }
        };

        let admin = match self.providers.admin_identity().await {
            Ok(admin) => admin,
            Err(source) => {
                let err = ClientError::remote(Operation::VerifyProvider, source);
                session.statuses.provider_verification = OperationStatus::failed(&err);
                return Err(err);
            }
        };
        if admin != identity {
            let err = ClientError::invalid_input("Only admin can verify providers");
            session.statuses.provider_verification = OperationStatus::failed(&err);
            return Err(err);
        }

        session.statuses.provider_verification =
            OperationStatus::started(Operation::VerifyProvider);

        if let Err(source) = submit_and_confirm(self.providers.verify(&provider)).await {
            let err = ClientError::remote(Operation::VerifyProvider, source);
            session.statuses.provider_verification = OperationStatus::failed(&err);
            return Err(err);
        }

        tracing::info!("provider {} verified", provider);
        session.statuses.provider_verification =
            OperationStatus::succeeded(Operation::VerifyProvider);
        Ok(())
    }
}

fn patient_profile(form: &NewPatient) -> ClientResult<PatientProfile> {
    const ALL_REQUIRED: &str = "All fields are required";

    let did = require(&form.did, ALL_REQUIRED)?;
    let name = require(&form.name, ALL_REQUIRED)?;
    let date_of_birth = require(&form.date_of_birth, ALL_REQUIRED)?;
    let medical_profile = require(&form.medical_profile, ALL_REQUIRED)?;

    Ok(PatientProfile {
        did: did.to_owned(),
        name: name.to_owned(),
        date_of_birth: parse_date_of_birth(date_of_birth)?,
        medical_profile: medical_profile.to_owned(),
    })
}

fn provider_registration(form: &NewProvider) -> ClientResult<ProviderRegistration> {
    const REQUIRED: &str = "DID, name and role are required";

    Ok(ProviderRegistration {
        did: require(&form.did, REQUIRED)?.to_owned(),
        name: require(&form.name, REQUIRED)?.to_owned(),
        role: require(&form.role, REQUIRED)?.to_owned(),
        license_id: form
            .license_id
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_owned(),
        hospital: form
            .hospital
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_owned(),
    })
}
