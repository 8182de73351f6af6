use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::config::{Bounds, UserConfig};
use crate::data::RoadNetwork;
use crate::data::osm::{Coord, NodeId, Way, WayId};
use crate::errors::{Error, Result};
use crate::etl::{write_cache, Etl};

pub const ETL_NAME: &str = "parse_osm";
pub const OUTPUT_FILE_NAME: &str = "road_network.rkyv";

fn attribute(el: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attribute_res in el.attributes() {
        let attribute = attribute_res?;
        if attribute.key.as_ref() == key {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn required_attribute<T>(el: &BytesStart, key: &[u8]) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let element = String::from_utf8_lossy(el.name().as_ref()).into_owned();
    let key_str = String::from_utf8_lossy(key);
    let value = attribute(el, key)?.ok_or_else(|| {
        Error::in_component(ETL_NAME, format!("<{element}> without a {key_str} attribute"))
    })?;
    value.parse().map_err(|err| {
        Error::in_component(ETL_NAME, format!("<{element}> has a bad {key_str} attribute {value:?}: {err}"))
    })
}

struct PendingWay {
    id: WayId,
    nodes: Vec<NodeId>,
    is_road: bool,
}

/// Collects, in document order, every way tagged `highway=<one of way_types>`.
pub fn read_ways<R: BufRead>(reader: &mut Reader<R>, way_types: &[String]) -> Result<Vec<Way>> {
    let mut buf = Vec::new();
    let mut ways = Vec::new();
    let mut pending: Option<PendingWay> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"way" => {
                pending = Some(PendingWay {
                    id: required_attribute(&e, b"id")?,
                    nodes: Vec::new(),
                    is_road: false,
                });
            },
            Event::Start(e) | Event::Empty(e) => {
                if let Some(way) = pending.as_mut() {
                    match e.name().as_ref() {
                        b"nd" => way.nodes.push(required_attribute(&e, b"ref")?),
                        b"tag" => {
                            if attribute(&e, b"k")?.as_deref() == Some("highway") {
                                let value = attribute(&e, b"v")?;
                                way.is_road |= way_types.iter().any(|t| Some(t.as_str()) == value.as_deref());
                            }
                        },
                        _ => (),
                    }
                }
            },
            Event::End(e) if e.name().as_ref() == b"way" => {
                if let Some(way) = pending.take() {
                    if way.is_road {
                        ways.push(Way { id: way.id, nodes: way.nodes });
                    }
                }
            },
            _ => (),
        }
        // if we don't keep a borrow elsewhere, we can clear the buffer to keep memory usage low
        buf.clear();
    }
    Ok(ways)
}

/// Reads the coordinates of the `wanted` nodes, skipping those outside `bounds`.
pub fn read_nodes<R: BufRead>(
    reader: &mut Reader<R>,
    wanted: &HashSet<NodeId>,
    bounds: Option<&Bounds>,
) -> Result<HashMap<NodeId, Coord>> {
    let mut buf = Vec::new();
    let mut coordinates = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"node" => {
                let id: NodeId = required_attribute(&e, b"id")?;
                if wanted.contains(&id) {
                    let lat: f64 = required_attribute(&e, b"lat")?;
                    let lon: f64 = required_attribute(&e, b"lon")?;
                    if bounds.map_or(true, |b| b.contains(lon, lat)) {
                        coordinates.insert(id, Coord::new(lon, lat));
                    }
                }
            },
            _ => (),
        }
        buf.clear();
    }
    Ok(coordinates)
}

pub struct ParseOsmEtl<'a> {
    config: &'a UserConfig,
}

impl ParseOsmEtl<'_> {
    fn create_osm_reader(&self) -> Result<Reader<Box<dyn BufRead>>> {
        let path = Path::new(&self.config.data_path);
        let file = fs::File::open(path)
            .map_err(|err| Error::in_component(ETL_NAME, format!("could not open {}: {err}", path.display())))?;
        let file_reader = BufReader::new(file);
        let input: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "xz") {
            Box::new(BufReader::new(XzDecoder::new(file_reader)))
        } else {
            Box::new(file_reader)
        };
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);

        Ok(reader)
    }

    pub fn new(config: &UserConfig) -> ParseOsmEtl<'_> {
        ParseOsmEtl {
            config
        }
    }
}

impl Etl for ParseOsmEtl<'_> {
    type Input = Vec<Way>;
    type Output = RoadNetwork;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_file_name(&self) -> &str {
        OUTPUT_FILE_NAME
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        let mut reader = self.create_osm_reader()?;
        let ways = read_ways(&mut reader, &self.config.way_types)?;
        info!(ways = ways.len(); "Found ways");
        Ok(ways)
    }

    /// Second pass over the file, for the coordinates of the nodes the ways use.
    fn transform(&mut self, ways: Self::Input) -> Result<Self::Output> {
        let wanted: HashSet<NodeId> = ways.iter()
            .flat_map(|way| way.nodes.iter().copied())
            .collect();
        debug!(referenced_nodes = wanted.len(); "Reading node coordinates");

        let mut reader = self.create_osm_reader()?;
        let coordinates = read_nodes(&mut reader, &wanted, self.config.bounds.as_ref())?;
        info!(nodes = coordinates.len(), missing = wanted.len() - coordinates.len(); "Found (traversable) nodes");

        Ok(RoadNetwork {
            coordinates,
            ways,
        })
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        write_cache(&self.output_path(dir), &output)
    }
}
