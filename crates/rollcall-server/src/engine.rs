use rollcall_facedb::{load_image, FaceDb, FaceDbError, FaceEncoder, FaceId, Recognition};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    FaceDb(#[from] FaceDbError),
    #[error("could not write upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// What a save request did to the face database.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The face already matched an enrolled identity; nothing was added.
    AlreadyKnown(Recognition),
    /// A new identity was enrolled. `confirmed` is whether the upload
    /// recognizes as that identity straight after enrollment.
    Added { id: String, confirmed: bool },
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    SaveFace {
        upload: Vec<u8>,
        id: FaceId,
        reply: oneshot::Sender<Result<SaveOutcome, EngineError>>,
    },
    RecognizeFace {
        upload: Vec<u8>,
        reply: oneshot::Sender<Result<Option<Recognition>, EngineError>>,
    },
    Count {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll the face in `upload` under `id`, unless it is already known.
    pub async fn save_face(&self, upload: Vec<u8>, id: FaceId) -> Result<SaveOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::SaveFace { upload, id, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Match the most confident face in `upload`.
    pub async fn recognize_face(&self, upload: Vec<u8>) -> Result<Option<Recognition>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::RecognizeFace { upload, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Number of enrolled faces.
    pub async fn count(&self) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Count { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The engine owns the face database and the upload file. Requests are
/// served one at a time, so the upload file is never written concurrently.
pub fn spawn_engine<E>(db: FaceDb<E>, upload_path: PathBuf) -> Result<EngineHandle, EngineError>
where
    E: FaceEncoder + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(QUEUE_DEPTH);
    let mut db = db;

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!(upload = %upload_path.display(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::SaveFace { upload, id, reply } => {
                        let _ = reply.send(run_save(&mut db, &upload_path, &upload, &id));
                    }
                    EngineRequest::RecognizeFace { upload, reply } => {
                        let _ = reply.send(run_recognize(&mut db, &upload_path, &upload));
                    }
                    EngineRequest::Count { reply } => {
                        let _ = reply.send(db.len().map_err(EngineError::from));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn decode_upload(upload_path: &Path, upload: &[u8]) -> Result<image::GrayImage, EngineError> {
    std::fs::write(upload_path, upload)?;
    Ok(load_image(upload_path)?)
}

fn run_save<E: FaceEncoder>(
    db: &mut FaceDb<E>,
    upload_path: &Path,
    upload: &[u8],
    id: &FaceId,
) -> Result<SaveOutcome, EngineError> {
    let image = decode_upload(upload_path, upload)?;

    if let Some(existing) = db.recognize(&image)? {
        tracing::info!(
            id = %existing.id,
            name = %existing.name,
            confidence = existing.confidence,
            "face already enrolled; not adding"
        );
        return Ok(SaveOutcome::AlreadyKnown(existing));
    }

    let key = id.to_string();
    db.add(&image, &key, &id.name)?;

    let confirmed = match db.recognize(&image)? {
        Some(r) => r.id == key,
        None => false,
    };
    if confirmed {
        tracing::info!(id = %key, "enrollment confirmed");
    } else {
        tracing::warn!(id = %key, "enrolled face did not recognize as itself");
    }
    Ok(SaveOutcome::Added { id: key, confirmed })
}

fn run_recognize<E: FaceEncoder>(
    db: &mut FaceDb<E>,
    upload_path: &Path,
    upload: &[u8],
) -> Result<Option<Recognition>, EngineError> {
    let image = decode_upload(upload_path, upload)?;
    Ok(db.recognize(&image)?)
}
