//! Face database maintenance commands.

use anyhow::{bail, Context, Result};
use rollcall_facedb::{load_image, FaceDb, FaceDbConfig, FaceId, FaceStore};
use std::path::Path;

pub fn add(config: &FaceDbConfig, image: &Path, name: &str, reg_no: &str) -> Result<()> {
    let id = FaceId::new(reg_no, name)?;
    let image = load_image(image).with_context(|| format!("failed to load {}", image.display()))?;

    let mut db = FaceDb::open(config).context("failed to open face database")?;
    if let Some(existing) = db.recognize(&image)? {
        bail!(
            "face already enrolled as {} (similarity {:.3})",
            existing.id,
            existing.confidence
        );
    }
    let key = db.add(&image, &id.to_string(), &id.name)?;
    println!("Enrolled {key}");
    Ok(())
}

/// Listing and removal only touch the store, so no models are loaded.
pub fn list(config: &FaceDbConfig) -> Result<()> {
    let store = FaceStore::open(&config.db_path)?;
    let records = store.all()?;
    if records.is_empty() {
        println!("No faces enrolled");
        return Ok(());
    }

    println!("{:<16} {:<24} {}", "REG NO", "NAME", "ENROLLED");
    for record in records {
        let reg_no = FaceId::parse(&record.id)
            .map(|id| id.reg_no)
            .unwrap_or_else(|_| "?".to_string());
        println!("{:<16} {:<24} {}", reg_no, record.name, record.created_at);
    }
    Ok(())
}

pub fn remove(config: &FaceDbConfig, id: &str) -> Result<()> {
    let store = FaceStore::open(&config.db_path)?;
    if !store.remove(id)? {
        bail!("no face enrolled with id {id:?}");
    }
    println!("Removed {id}");
    Ok(())
}
