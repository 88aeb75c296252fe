//! Out-of-band pixel size decoding.
//!
//! Decoding runs on tokio's blocking pool. The caller polls for completion at a
//! fixed interval and gives up once the timeout elapses. A finished decode is only
//! applied if the costume it was started for still holds the same payload.

use crate::assets::measure;
use crate::error::ProjectError;
use crate::model::{AssetData, PixelSize, Project, ScriptableId};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_millis(5000),
        }
    }
}

/// One pending decode: which costume it is for, and the payload it was started from.
#[derive(Debug, Clone)]
pub struct SizeJob {
    pub owner: ScriptableId,
    pub costume_index: usize,
    pub data: AssetData,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeReport {
    pub applied: usize,
    /// Completed decodes whose costume was removed or replaced meanwhile.
    pub stale: usize,
    pub failures: Vec<(ScriptableId, usize, ProjectError)>,
}

/// Every resolved costume that has no size yet.
pub fn size_jobs(project: &Project) -> Vec<SizeJob> {
    let mut jobs = Vec::new();
    for s in project.scriptables() {
        for (costume_index, costume) in s.costumes.iter().enumerate() {
            if costume.size.get().is_some() {
                continue;
            }
            if let Some(data) = costume.payload.data() {
                jobs.push(SizeJob {
                    owner: s.id,
                    costume_index,
                    data: data.clone(),
                });
            }
        }
    }
    jobs
}

/// Decodes `data` off the async executor, polling every `poll_interval`.
pub async fn decode_size(data: AssetData, options: DecodeOptions) -> Result<PixelSize, ProjectError> {
    let extension = data.extension.clone();
    let bytes = data.bytes.clone();
    let worker_extension = extension.clone();
    let handle = tokio::task::spawn_blocking(move || measure(&worker_extension, &bytes));

    let started = Instant::now();
    let mut ticker = tokio::time::interval(options.poll_interval.max(Duration::from_millis(1)));
    loop {
        ticker.tick().await;
        if handle.is_finished() {
            return match handle.await {
                Ok(result) => result,
                Err(e) => Err(ProjectError::ImageDecode {
                    extension,
                    message: e.to_string(),
                }),
            };
        }
        if started.elapsed() >= options.timeout {
            handle.abort();
            return Err(ProjectError::DecodeTimeout {
                extension,
                waited_ms: started.elapsed().as_millis(),
            });
        }
    }
}

/// Stores a decoded size, unless the costume is gone or now holds a different payload.
pub fn apply_decoded(project: &mut Project, job: &SizeJob, size: PixelSize) -> bool {
    let Some(owner) = project.scriptable_mut(job.owner) else {
        return false;
    };
    let Some(costume) = owner.costumes.get_mut(job.costume_index) else {
        return false;
    };
    match costume.payload.data() {
        Some(current) if Arc::ptr_eq(&current.bytes, &job.data.bytes) => {
            costume.apply_size(size);
            true
        }
        _ => false,
    }
}

/// Decodes every unsized costume concurrently and applies the results.
///
/// Per-costume failures (undecodable data, timeouts) are collected in the report
/// rather than aborting the remaining decodes.
pub async fn decode_costume_sizes(
    project: &mut Project,
    options: DecodeOptions,
) -> Result<DecodeReport, ProjectError> {
    let jobs = size_jobs(project);
    let mut pending = Vec::with_capacity(jobs.len());
    for job in jobs {
        let handle = tokio::spawn(decode_size(job.data.clone(), options));
        pending.push((job, handle));
    }

    let mut report = DecodeReport::default();
    for (job, handle) in pending {
        let outcome = handle.await.map_err(|e| ProjectError::ImageDecode {
            extension: job.data.extension.clone(),
            message: e.to_string(),
        })?;
        match outcome {
            Ok(size) => {
                if apply_decoded(project, &job, size) {
                    report.applied += 1;
                } else {
                    report.stale += 1;
                }
            }
            Err(e) => report.failures.push((job.owner, job.costume_index, e)),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Costume, Role, Scriptable, SpriteInfo};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn fast() -> DecodeOptions {
        DecodeOptions {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_secs(10),
        }
    }

    fn project_with_cat(costume: Costume) -> (Project, ScriptableId) {
        let mut project = Project::new();
        let id = project.allocate_id();
        let mut cat = Scriptable::new(id, "Cat", Role::Sprite(SpriteInfo::default()));
        cat.costumes.push(costume);
        project.add_sprite(cat);
        (project, id)
    }

    #[tokio::test]
    async fn decodes_and_centers_new_costumes() {
        let (mut project, id) = project_with_cat(Costume::new("box", "png", png(10, 6)));
        let report = decode_costume_sizes(&mut project, fast()).await.unwrap();
        assert_eq!(report.applied, 1);
        assert!(report.failures.is_empty());
        let costume = &project.scriptable(id).unwrap().costumes[0];
        assert_eq!(*costume.size.get(), Some(PixelSize { width: 10, height: 6 }));
        assert_eq!(costume.rotation_center_x, 5.0);
        assert_eq!(costume.rotation_center_y, 3.0);
    }

    #[tokio::test]
    async fn undecodable_costume_is_reported() {
        let (mut project, id) = project_with_cat(Costume::new("bad", "png", b"junk".to_vec()));
        let report = decode_costume_sizes(&mut project, fast()).await.unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, id);
        assert!(matches!(report.failures[0].2, ProjectError::ImageDecode { .. }));
    }

    #[tokio::test]
    async fn zero_timeout_reports_timeout() {
        let data = AssetData::new("png", png(4, 4));
        let options = DecodeOptions {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::ZERO,
        };
        // The first tick fires immediately; the worker may or may not be done by then.
        match decode_size(data, options).await {
            Ok(size) => assert_eq!(size, PixelSize { width: 4, height: 4 }),
            Err(e) => assert!(matches!(e, ProjectError::DecodeTimeout { .. })),
        }
    }

    #[tokio::test]
    async fn stale_results_are_dropped() {
        let (mut project, id) = project_with_cat(Costume::new("box", "png", png(2, 2)));
        let jobs = size_jobs(&project);
        let job = jobs.iter().find(|j| j.owner == id).unwrap().clone();
        let size = decode_size(job.data.clone(), fast()).await.unwrap();

        project.scriptable_mut(id).unwrap().costumes[0] = Costume::new("other", "png", png(2, 2));
        assert!(!apply_decoded(&mut project, &job, size));

        project.remove_sprite(id);
        assert!(!apply_decoded(&mut project, &job, size));
    }

    #[test]
    fn sized_costumes_need_no_job() {
        let project = Project::new();
        assert!(size_jobs(&project).is_empty());
    }
}
