pub mod parse_osm;
pub mod resample_points;
pub mod segment_roads;

use std::{fs, path::{Path, PathBuf}, time::Instant};
use log::{info, error};
use rkyv::{de::deserializers::SharedDeserializeMap, ser::serializers::AllocSerializer, AlignedVec, Archive};

use crate::config::UserConfig;
use crate::errors::{Error, Result};

use self::parse_osm::ParseOsmEtl;
use self::resample_points::ResamplePointsEtl;
use self::segment_roads::SegmentRoadsEtl;


pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;
    fn output_file_name(&self) -> &str;

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.output_file_name())
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(self.output_path(dir).try_exists()?)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        if self.is_cached(dir)? {
            info!(etl_name = self.etl_name(); "Removing cached output");
            fs::remove_file(self.output_path(dir))?;
        }
        Ok(())
    }

    fn process(&mut self, dir: &Path) -> Result<()> {
        info!(etl_name = self.etl_name(); "Starting ETL process");
        let started = Instant::now();
        if self.is_cached(dir)? {
            info!(etl_name = self.etl_name(); "Using cached value");
        } else {
            info!(etl_name = self.etl_name(); "Extracting");
            let input = match self.extract(dir) {
                Ok(input) => Ok(input),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.message.as_str(); "Extraction failed with error");
                    Err(err)
                },
            }?;

            info!(etl_name = self.etl_name(); "Transforming");
            let output = match self.transform(input) {
                Ok(output) => Ok(output),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.message.as_str(); "Transformation failed with error");
                    Err(err)
                },
            }?;

            info!(etl_name = self.etl_name(); "Loading");
            match self.load(dir, output) {
                Ok(_) => Ok(()),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.message.as_str(); "Loading failed with error");
                    Err(err)
                },
            }?;
        }
        info!(etl_name = self.etl_name(), elapsed_ms = started.elapsed().as_millis() as u64; "Process finished");
        Ok(())
    }
}

/// Runs `etl`, first dropping its cached output if anything upstream was recomputed.
fn run_stage<E: Etl>(etl: &mut E, dir: &Path, stale: &mut bool) -> Result<()> {
    if *stale {
        etl.clean(dir)?;
    }
    *stale |= !etl.is_cached(dir)?;
    etl.process(dir)
}

/// Parses, segments and resamples `config.data_path`, leaving every stage output in `dir`.
/// With `clean`, every stage is recomputed.
pub fn run_pipeline(config: &UserConfig, dir: &Path, clean: bool) -> Result<()> {
    let mut stale = clean;
    run_stage(&mut ParseOsmEtl::new(config), dir, &mut stale)?;
    run_stage(&mut SegmentRoadsEtl::default(), dir, &mut stale)?;
    run_stage(&mut ResamplePointsEtl::new(config), dir, &mut stale)
}

pub fn write_cache<T>(path: &Path, value: &T) -> Result<()>
where
    T: rkyv::Serialize<AllocSerializer<256>>,
{
    let bytes = rkyv::to_bytes::<_, 256>(value)
        .map_err(|err| Error::from(format!("could not serialize {}: {err:?}", path.display())))?;
    // a half-written file must never look like a finished cache
    let partial = path.with_extension("partial");
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, path)?;
    Ok(())
}

pub fn read_cache<T>(path: &Path) -> Result<T>
where
    T: Archive,
    T::Archived: rkyv::Deserialize<T, SharedDeserializeMap>,
{
    let buf_vec = fs::read(path)
        .map_err(|err| Error::from(format!("could not read cache {}: {err}", path.display())))?;
    let mut aligned = AlignedVec::with_capacity(buf_vec.len());
    aligned.extend_from_slice(&buf_vec);

    let value: T = unsafe {
        rkyv::from_bytes_unchecked(&aligned)
    }.map_err(|err| Error::from(format!("could not deserialize cache {}: {err:?}", path.display())))?;
    Ok(value)
}
