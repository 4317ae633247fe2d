use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::model::{Job, UserRecord};

use super::{JobStore, RehydratedJob};

type Document = HashMap<String, UserRecord>;

/// JSON-backed [`JobStore`]. The whole document is held in memory and
/// guarded by a single mutex; every mutation rewrites the file atomically
/// (write-temp + rename), mirroring `config::loader::save_config`.
pub struct JsonJobStore {
    path: PathBuf,
    doc: Arc<Mutex<Document>>,
}

impl JsonJobStore {
    /// Load (or create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let doc = Self::read_document(&path)?;
        Ok(Self {
            path,
            doc: Arc::new(Mutex::new(doc)),
        })
    }

    fn read_document(path: &Path) -> AppResult<Document> {
        match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(Document::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| AppError::Store(format!("corrupt job store at {path:?}: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(AppError::Store(format!("failed to read job store {path:?}: {e}"))),
        }
    }

    /// Persist `doc` to disk via write-temp + rename.
    fn write_document(path: &Path, doc: &Document) -> AppResult<()> {
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| AppError::Store(format!("failed to serialize job store: {e}")))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Store(format!("failed to create store dir: {e}")))?;
        }

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &content)
            .map_err(|e| AppError::Store(format!("failed to write temp store: {e}")))?;
        fs::rename(&tmp_path, path)
            .map_err(|e| AppError::Store(format!("failed to replace job store: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for JsonJobStore {
    #[tracing::instrument(name = "store.put_job", skip(self, job), fields(user_id = %user_id, job_name = %job.job_name))]
    async fn put_job(&self, user_id: &str, job: Job) -> AppResult<Option<Job>> {
        let mut doc = self.doc.lock().await;
        let record = doc.entry(user_id.to_string()).or_default();
        let previous = record.jobs.insert(job.job_name.clone(), job);
        Self::write_document(&self.path, &doc)?;
        Ok(previous)
    }

    async fn get_job(&self, user_id: &str, job_name: &str) -> AppResult<Option<Job>> {
        let doc = self.doc.lock().await;
        Ok(doc.get(user_id).and_then(|r| r.jobs.get(job_name).cloned()))
    }

    #[tracing::instrument(name = "store.remove_job", skip(self), fields(user_id = %user_id, job_name = %job_name))]
    async fn remove_job(&self, user_id: &str, job_name: &str) -> AppResult<Option<Job>> {
        let mut doc = self.doc.lock().await;
        let removed = doc.get_mut(user_id).and_then(|r| r.jobs.remove(job_name));
        if removed.is_some() {
            Self::write_document(&self.path, &doc)?;
        }
        Ok(removed)
    }

    async fn list_jobs_by_user(&self, user_id: &str) -> AppResult<Vec<Job>> {
        let doc = self.doc.lock().await;
        Ok(doc
            .get(user_id)
            .map(|r| r.jobs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_ci(&self, user_id: &str) -> AppResult<Option<String>> {
        let doc = self.doc.lock().await;
        Ok(doc.get(user_id).and_then(|r| r.ci_session.clone()))
    }

    #[tracing::instrument(name = "store.set_ci", skip(self, ci_session), fields(user_id = %user_id))]
    async fn set_ci(&self, user_id: &str, ci_session: String) -> AppResult<()> {
        let mut doc = self.doc.lock().await;
        let record = doc.entry(user_id.to_string()).or_default();
        record.ci_session = Some(ci_session);
        Self::write_document(&self.path, &doc)
    }

    async fn rehydrate(&self) -> AppResult<Vec<RehydratedJob>> {
        let doc = self.doc.lock().await;
        let now = Utc::now();
        let mut out = Vec::new();
        for (user_id, record) in doc.iter() {
            for job in record.jobs.values() {
                if job.exec_at > now {
                    out.push(RehydratedJob {
                        user_id: user_id.clone(),
                        job: job.clone(),
                    });
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bank, BromoProfile, LeaderIdentity, Profile, Site};
    use chrono::{Duration, NaiveDate};
    use tempfile::TempDir;

    fn sample_job(name: &str, exec_at: chrono::DateTime<Utc>) -> Job {
        Job {
            job_name: name.to_string(),
            site: Site::Bromo,
            booking_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            exec_at,
            profile: Profile::Bromo(BromoProfile {
                leader: LeaderIdentity {
                    name: "Budi".into(),
                    identity_kind: "ktp".into(),
                    identity_no: "1".into(),
                    phone: "08".into(),
                },
                gate: 1,
                vehicle: 2,
                vehicle_count: 1,
                male: 1,
                female: 1,
                bank: Bank::Qris,
                address: String::new(),
                province_code: String::new(),
                district_code: String::new(),
            }),
            cookies: Default::default(),
            reminder_minutes: None,
            chat_id: "chat-1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = JsonJobStore::open(dir.path().join("jobs.json")).unwrap();
        let job = sample_job("bromo-1-budi-2025-10-01-2025-09-30-070000", Utc::now() + Duration::hours(1));
        store.put_job("1", job.clone()).await.unwrap();

        let fetched = store.get_job("1", &job.job_name).await.unwrap().unwrap();
        assert_eq!(fetched.job_name, job.job_name);
    }

    #[tokio::test]
    async fn reload_from_disk_is_identical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        let store = JsonJobStore::open(&path).unwrap();
        let job = sample_job("bromo-1-budi-2025-10-01-2025-09-30-070000", Utc::now() + Duration::hours(1));
        store.put_job("1", job.clone()).await.unwrap();
        store.set_ci("1", "tok".to_string()).await.unwrap();
        drop(store);

        let reloaded = JsonJobStore::open(&path).unwrap();
        let fetched = reloaded.get_job("1", &job.job_name).await.unwrap().unwrap();
        assert_eq!(fetched.job_name, job.job_name);
        assert_eq!(reloaded.get_ci("1").await.unwrap(), Some("tok".to_string()));
    }

    #[tokio::test]
    async fn remove_nonexistent_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonJobStore::open(dir.path().join("jobs.json")).unwrap();
        assert!(store.remove_job("1", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rehydrate_skips_past_jobs() {
        let dir = TempDir::new().unwrap();
        let store = JsonJobStore::open(dir.path().join("jobs.json")).unwrap();
        let future = sample_job("bromo-1-budi-2025-10-01-2025-09-30-070000", Utc::now() + Duration::hours(1));
        let past = sample_job("bromo-1-budi-2025-09-01-2025-08-30-070000", Utc::now() - Duration::hours(1));
        store.put_job("1", future.clone()).await.unwrap();
        store.put_job("1", past).await.unwrap();

        let rehydrated = store.rehydrate().await.unwrap();
        assert_eq!(rehydrated.len(), 1);
        assert_eq!(rehydrated[0].job.job_name, future.job_name);
    }

    #[tokio::test]
    async fn put_job_returns_previous_on_replace() {
        let dir = TempDir::new().unwrap();
        let store = JsonJobStore::open(dir.path().join("jobs.json")).unwrap();
        let job = sample_job("bromo-1-budi-2025-10-01-2025-09-30-070000", Utc::now() + Duration::hours(1));
        assert!(store.put_job("1", job.clone()).await.unwrap().is_none());
        let mut edited = job.clone();
        edited.reminder_minutes = Some(10);
        let previous = store.put_job("1", edited).await.unwrap();
        assert!(previous.is_some());
        assert_eq!(previous.unwrap().reminder_minutes, None);
    }
}
