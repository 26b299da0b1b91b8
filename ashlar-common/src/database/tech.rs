//! Technology description: metal stack and placement sites.

use super::{LayerKey, SiteKey};
use crate::geometry::Size64;
use crate::store::Store;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Routing,
    Cut,
    Masterslice,
    Overlap,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerDirection {
    Horizontal,
    Vertical,
    #[default]
    None,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    #[serde(default)]
    pub direction: LayerDirection,
    /// Track pitch along x and y, nm.
    pub pitch: Size64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub spacing: i64,
}

/// The minimum legal placement grid unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub size: Size64,
    #[serde(default)]
    pub class: String,
    /// Symmetry letters as found in the technology description, e.g. "XY".
    #[serde(default)]
    pub symmetry: String,
}

#[derive(Debug, Default)]
pub struct TechLib {
    pub layers: Store<LayerKey, Layer>,
    pub sites: Store<SiteKey, Site>,
}

impl TechLib {
    pub fn add_layer(&mut self, layer: Layer) -> Option<LayerKey> {
        let name = layer.name.clone();
        self.layers.insert(&name, layer)
    }

    pub fn add_site(&mut self, site: Site) -> Option<SiteKey> {
        let name = site.name.clone();
        self.sites.insert(&name, site)
    }

    pub fn site_by_name(&self, name: &str) -> Option<&Site> {
        self.sites.lookup(name).and_then(|k| self.sites.get(k))
    }

    /// Routing layers only, in definition order.
    pub fn routing_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers
            .iter()
            .map(|(_, l)| l)
            .filter(|l| l.kind == LayerKind::Routing)
    }
}
