//! Floorplan: placement regions and their site rows.

use super::RegionKey;
use crate::geometry::{Coord64, Rect64, Size64};
use crate::store::Store;
use anyhow::{ensure, Result};

/// One cell-height strip inside a region.
#[derive(Clone, Debug)]
pub struct Row {
    pub rect: Rect64,
    /// Odd rows are usually flipped so power rails abut.
    pub flipped: bool,
    pub site: String,
}

/// A rectangular sub-area of the floorplan. The `halo` margins are kept
/// free of cells; `placement_rect` is the region rectangle minus halo.
#[derive(Clone, Debug, Default)]
pub struct Region {
    pub name: String,
    pub rect: Rect64,
    /// Halo margins: left, bottom, right, top (nm).
    pub halo: [i64; 4],
    pub site: String,
    pub rows: Vec<Row>,
}

impl Region {
    pub fn placement_rect(&self) -> Rect64 {
        self.rect
            .shrunk(self.halo[0], self.halo[1], self.halo[2], self.halo[3])
    }

    /// Fill the region with rows of the given site, bottom to top.
    pub fn build_rows(&mut self, site_size: Size64) -> Result<()> {
        ensure!(
            !site_size.is_null(),
            "cannot build rows from a null site size"
        );
        let place = self.placement_rect();
        let row_count = place.height() / site_size.h;
        let row_width = (place.width() / site_size.w) * site_size.w;
        ensure!(
            row_count > 0 && row_width > 0,
            "region {:?} placement area is too small for site rows",
            self.name
        );

        self.rows.clear();
        for i in 0..row_count {
            let ll = Coord64::new(place.ll.x, place.ll.y + i * site_size.h);
            self.rows.push(Row {
                rect: Rect64::from_size(ll, Size64::new(row_width, site_size.h)),
                flipped: i % 2 == 1,
                site: self.site.clone(),
            });
        }
        Ok(())
    }

    /// Check the row invariants: row height equals site height and the row
    /// x-extent lies inside the placement rectangle.
    pub fn check_rows(&self, site_size: Size64) -> Result<()> {
        let place = self.placement_rect();
        for (i, row) in self.rows.iter().enumerate() {
            ensure!(
                row.rect.height() == site_size.h,
                "row {} height {} does not match site height {}",
                i,
                row.rect.height(),
                site_size.h
            );
            ensure!(
                row.rect.ll.x >= place.ll.x && row.rect.ur.x <= place.ur.x,
                "row {} extends outside the placement rectangle",
                i
            );
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Floorplan {
    pub regions: Store<RegionKey, Region>,
}

impl Floorplan {
    pub fn add_region(&mut self, region: Region) -> Option<RegionKey> {
        let name = region.name.clone();
        self.regions.insert(&name, region)
    }

    pub fn first_region(&self) -> Option<(RegionKey, &Region)> {
        self.regions.iter().next()
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }
}
