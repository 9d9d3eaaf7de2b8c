use crate::*;
use byteorder::LE;
use byteorder::WriteBytesExt;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

/// Everything one hand-size group produced.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOutput {
    pub group: usize,
    /// Original hand index of every labelled row.
    pub hands: Vec<usize>,
    pub clustering: Clustering,
    /// Empty under the identity mapping.
    pub normalization: Normalization,
}

/// Reproducibility record of one group.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GroupRecord {
    pub group: usize,
    pub population: usize,
    pub k: usize,
    pub identity: bool,
    pub skipped: bool,
    pub inertia: f64,
    pub seconds: f64,
}

/// Reproducibility record of a whole run, written as `config.json`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    pub table: PathBuf,
    pub hands: HandSource,
    pub device: Device,
    /// Backend that actually ran.
    pub backend: String,
    pub schedule: Schedule,
    pub clusters: [usize; HAND_MAX],
    pub no_bet: usize,
    pub ambiguous: bool,
    pub groups: Vec<GroupRecord>,
}

/// Destination for pipeline outputs.
///
/// Groups arrive one at a time in ascending size, then the global mapping,
/// then the manifest.
pub trait Sink {
    fn group(&mut self, output: GroupOutput) -> Result<()>;
    fn buckets(&mut self, buckets: &Buckets) -> Result<()>;
    fn manifest(&mut self, manifest: &Manifest) -> Result<()>;
}

/// Little-endian binary artifacts in one directory.
#[derive(Debug, Clone)]
pub struct Artifacts {
    dir: PathBuf,
}

impl Artifacts {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::io(dir))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn labels(&self, group: usize) -> PathBuf {
        self.dir.join(format!("labels_n{}.bin", group))
    }
    pub fn centers(&self, group: usize) -> PathBuf {
        self.dir.join(format!("centers_n{}.bin", group))
    }
    pub fn norm(&self, group: usize) -> PathBuf {
        self.dir.join(format!("norm_n{}.bin", group))
    }
    pub fn mapping(&self) -> PathBuf {
        self.dir.join("bucket_of_hand_index.bin")
    }
    pub fn config(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    /// Run `body` against a buffered writer on `path`, mapping failures to it.
    fn write<F>(path: &Path, body: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
    {
        let file = File::create(path).map_err(Error::io(path))?;
        let ref mut writer = BufWriter::new(file);
        body(writer)
            .and_then(|_| writer.flush())
            .map_err(Error::io(path))?;
        log::debug!("{:<32}{:<32}", "wrote", path.display());
        Ok(())
    }
}

impl Sink for Artifacts {
    fn group(&mut self, output: GroupOutput) -> Result<()> {
        let GroupOutput {
            group,
            clustering,
            normalization,
            ..
        } = output;
        Self::write(&self.labels(group), |w| {
            clustering
                .labels
                .iter()
                .try_for_each(|l| w.write_i32::<LE>(*l as i32))
        })?;
        Self::write(&self.centers(group), |w| {
            w.write_u32::<LE>(clustering.centers.rows() as u32)?;
            w.write_u32::<LE>(clustering.centers.cols() as u32)?;
            clustering
                .centers
                .as_slice()
                .iter()
                .try_for_each(|x| w.write_f32::<LE>(*x))
        })?;
        Self::write(&self.norm(group), |w| {
            w.write_u32::<LE>(normalization.mean().len() as u32)?;
            normalization
                .mean()
                .iter()
                .chain(normalization.std().iter())
                .try_for_each(|x| w.write_f32::<LE>(*x as f32))
        })
    }

    fn buckets(&mut self, buckets: &Buckets) -> Result<()> {
        Self::write(&self.mapping(), |w| {
            buckets
                .as_slice()
                .iter()
                .try_for_each(|b| w.write_i32::<LE>(*b))
        })
    }

    fn manifest(&mut self, manifest: &Manifest) -> Result<()> {
        let ref path = self.config();
        let json = serde_json::to_string_pretty(manifest)?;
        Self::write(path, |w| w.write_all(json.as_bytes()))
    }
}

/// Keeps every output in memory.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    pub groups: BTreeMap<usize, GroupOutput>,
    pub buckets: Option<Buckets>,
    pub manifest: Option<Manifest>,
}

impl Sink for Memory {
    fn group(&mut self, output: GroupOutput) -> Result<()> {
        self.groups.insert(output.group, output);
        Ok(())
    }
    fn buckets(&mut self, buckets: &Buckets) -> Result<()> {
        self.buckets = Some(buckets.clone());
        Ok(())
    }
    fn manifest(&mut self, manifest: &Manifest) -> Result<()> {
        self.manifest = Some(manifest.clone());
        Ok(())
    }
}
