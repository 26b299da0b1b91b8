//! Test fixture helpers for building small placer netlists by hand.

use crate::net_model::{PlacerNetlist, PlacerNode};
use ashlar_common::geometry::{Coord64, Size64};
use std::collections::{hash_map::Entry, HashMap};

/// Build a netlist from named movable cells (sizes only), fixed cells
/// (positions + sizes) and net specs over the names. Nodes are added in
/// specification order, movable first, which keeps assertions simple.
pub fn make_netlist(
    movable: &[(&'static str, (i64, i64))],
    fixed: &[(&'static str, (i64, i64), (i64, i64))],
    nets: &[&[&'static str]],
) -> PlacerNetlist {
    let mut netlist = PlacerNetlist::default();
    let mut indices: HashMap<&'static str, usize> = Default::default();

    for (name, (w, h)) in movable {
        let id = netlist.create_node(PlacerNode::movable(Size64::new(*w, *h)), None);
        match indices.entry(name) {
            Entry::Occupied(_) => panic!("duplicate cell {} specified in test", name),
            Entry::Vacant(v) => v.insert(id),
        };
    }

    for (name, (x, y), (w, h)) in fixed {
        let id = netlist.create_node(
            PlacerNode::fixed_at(Coord64::new(*x, *y), Size64::new(*w, *h)),
            None,
        );
        match indices.entry(name) {
            Entry::Occupied(_) => panic!("duplicate fixed cell {} specified in test", name),
            Entry::Vacant(v) => v.insert(id),
        };
    }

    for spec in nets {
        let net = netlist.create_net(1.0);
        for name in *spec {
            netlist.connect(indices[name], net);
        }
    }

    netlist
}

#[macro_export]
macro_rules! netlist {
    (
        cells : [
            $($name:ident => ($w:expr, $h:expr);)*
        ],
        fixed_cells : [
            $($f_name:ident => ($f_x:expr, $f_y:expr), ($f_w:expr, $f_h:expr);)*
        ],
        nets : [
            $([$($cell:ident),*]),* $(,)?
        ]
    ) => {{
        let movable: &[(&'static str, (i64, i64))] = &[
            $( (stringify!($name), ($w, $h)) ),*
        ];
        let fixed: &[(&'static str, (i64, i64), (i64, i64))] = &[
            $( (stringify!($f_name), ($f_x, $f_y), ($f_w, $f_h)) ),*
        ];
        let nets: &[&[&'static str]] = &[
            $( &[ $(stringify!($cell)),* ] ),*
        ];

        $crate::test::make_netlist(movable, fixed, nets)
    }};
}
