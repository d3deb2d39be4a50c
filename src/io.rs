use std::io::Write;
use std::path::{Path, PathBuf};

use nalgebra as na;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::camera_model::{CameraModel, GenericModel};
use crate::error::{InputError, PipelineError};
use crate::export::TwoViewResult;
use crate::features::FeatureStore;
use crate::scene::{IndexT, Scene, View};
use crate::types::RvecTvec;

fn output_error(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Output {
        path: path.to_path_buf(),
        source,
    }
}

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize>(output_path: &Path, object: &T) -> std::io::Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: &Path) -> Result<T, InputError> {
    let contents = std::fs::read_to_string(file_path).map_err(|source| InputError::Io {
        path: file_path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| InputError::Json {
        path: file_path.to_path_buf(),
        source,
    })
}

pub fn load_features(file_path: &Path) -> Result<FeatureStore, InputError> {
    let store: FeatureStore = object_from_json(file_path)?;
    store.validate().map_err(|source| InputError::Features {
        path: file_path.to_path_buf(),
        source,
    })?;
    Ok(store)
}

/// Parses a row-major 3x3 calibration matrix written as nine whitespace separated numbers.
pub fn parse_intrinsic(contents: &str) -> Result<na::Matrix3<f64>, String> {
    let values = contents
        .split_whitespace()
        .map(|tok| tok.parse::<f64>().map_err(|_| format!("`{tok}` is not a number")))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != 9 {
        return Err(format!("expected 9 values, found {}", values.len()));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err("non finite value".to_string());
    }
    let k = na::Matrix3::from_row_slice(&values);
    if k[(0, 0)] <= 0.0 {
        return Err(format!("focal length {} is not positive", k[(0, 0)]));
    }
    if (k[(1, 1)] - k[(0, 0)]).abs() > 1e-9 * k[(0, 0)] {
        log::warn!(
            "fx {} and fy {} differ, only fx is used",
            k[(0, 0)],
            k[(1, 1)]
        );
    }
    Ok(k)
}

pub fn read_intrinsic(file_path: &Path) -> Result<na::Matrix3<f64>, InputError> {
    let contents = std::fs::read_to_string(file_path).map_err(|source| InputError::Io {
        path: file_path.to_path_buf(),
        source,
    })?;
    parse_intrinsic(&contents).map_err(|reason| InputError::MalformedCalibration {
        path: file_path.to_path_buf(),
        reason,
    })
}

pub fn write_intrinsic(file_path: &Path, k: &na::Matrix3<f64>) -> std::io::Result<()> {
    let mut s = String::new();
    for r in 0..3 {
        s += &format!("{} {} {}\n", k[(r, 0)], k[(r, 1)], k[(r, 2)]);
    }
    std::fs::write(file_path, s)
}

fn write_lines<I: IntoIterator<Item = String>>(path: &Path, lines: I) -> Result<(), PipelineError> {
    let mut s = String::new();
    for line in lines {
        s += &line;
        s.push('\n');
    }
    std::fs::write(path, s).map_err(output_error(path))
}

fn join(values: impl IntoIterator<Item = impl ToString>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Writes `posture_`, `center_`, `X_`, `x1_`, `x2_`, `desc1_` and `desc2_` text files.
pub fn write_two_view_result(output_dir: &Path, prefix: &str, result: &TwoViewResult) -> Result<Vec<PathBuf>, PipelineError> {
    let path = |name: &str| output_dir.join(format!("{name}_{prefix}.txt"));
    let r = result.rotation();
    let t = result.translation();
    let lms = &result.landmarks;

    let files: Vec<(PathBuf, Vec<String>)> = vec![
        (
            path("posture"),
            (0..3).map(|i| join(r.row(i).iter())).collect(),
        ),
        (path("center"), t.iter().map(|v| v.to_string()).collect()),
        (path("X"), lms.iter().map(|l| join(l.x.iter())).collect()),
        (path("x1"), lms.iter().map(|l| join(l.x1.iter())).collect()),
        (path("x2"), lms.iter().map(|l| join(l.x2.iter())).collect()),
        (path("desc1"), lms.iter().map(|l| join(l.desc1.iter())).collect()),
        (path("desc2"), lms.iter().map(|l| join(l.desc2.iter())).collect()),
    ];
    let mut written = Vec::with_capacity(files.len());
    for (p, lines) in files {
        write_lines(&p, lines)?;
        written.push(p);
    }
    Ok(written)
}

/// Landmarks in white followed by the camera centers in green, ASCII PLY.
pub fn write_ply(file_path: &Path, scene: &Scene) -> std::io::Result<()> {
    let mut s = String::new();
    s += "ply\nformat ascii 1.0\n";
    s += &format!("element vertex {}\n", scene.structure.len() + scene.poses.len());
    for axis in ["x", "y", "z"] {
        s += &format!("property double {axis}\n");
    }
    for channel in ["red", "green", "blue"] {
        s += &format!("property uchar {channel}\n");
    }
    s += "end_header\n";
    for lm in scene.structure.values() {
        s += &format!("{} {} {} 255 255 255\n", lm.x.x, lm.x.y, lm.x.z);
    }
    for pose in scene.poses.values() {
        let c = pose.center();
        s += &format!("{} {} {} 0 255 0\n", c.x, c.y, c.z);
    }
    std::fs::write(file_path, s)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub id: IndexT,
    pub pose: RvecTvec,
    pub center: [f64; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationSnapshot {
    pub id_view: IndexT,
    pub id_feat: usize,
    pub x: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkSnapshot {
    pub id: IndexT,
    pub x: [f64; 3],
    pub observations: Vec<ObservationSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrinsicSnapshot {
    pub id: IndexT,
    pub camera: GenericModel,
    pub params: Vec<f64>,
}

/// JSON form of a [`Scene`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub views: Vec<View>,
    pub intrinsics: Vec<IntrinsicSnapshot>,
    pub poses: Vec<PoseSnapshot>,
    pub structure: Vec<LandmarkSnapshot>,
}

impl From<&Scene> for SceneSnapshot {
    fn from(scene: &Scene) -> Self {
        SceneSnapshot {
            views: scene.views.values().copied().collect(),
            intrinsics: scene
                .intrinsics
                .iter()
                .map(|(id, cam)| IntrinsicSnapshot {
                    id: *id,
                    camera: *cam,
                    params: cam.params().iter().copied().collect(),
                })
                .collect(),
            poses: scene
                .poses
                .iter()
                .map(|(id, pose)| PoseSnapshot {
                    id: *id,
                    pose: RvecTvec::from(pose),
                    center: pose.center().into(),
                })
                .collect(),
            structure: scene
                .structure
                .iter()
                .map(|(id, lm)| LandmarkSnapshot {
                    id: *id,
                    x: lm.x.into(),
                    observations: lm
                        .obs
                        .iter()
                        .map(|(v, o)| ObservationSnapshot {
                            id_view: *v,
                            id_feat: o.id_feat,
                            x: o.x.into(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Writes `<stem>.ply` and `<stem>.json` next to each other.
pub fn write_scene_snapshot(output_dir: &Path, stem: &str, scene: &Scene) -> Result<Vec<PathBuf>, PipelineError> {
    let ply = output_dir.join(format!("{stem}.ply"));
    write_ply(&ply, scene).map_err(output_error(&ply))?;
    let json = output_dir.join(format!("{stem}.json"));
    object_to_json(&json, &SceneSnapshot::from(scene)).map_err(output_error(&json))?;
    Ok(vec![ply, json])
}
