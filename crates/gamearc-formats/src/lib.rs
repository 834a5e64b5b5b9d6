//! Built-in archive format descriptors.
//!
//! Each module describes one archive family as a
//! [`FormatDescriptor`](gamearc_core::FormatDescriptor). Registration order
//! below is the tie-break order when two formats score the same.
//!
//! | Name            | Games                                   | Shape                         |
//! |-----------------|-----------------------------------------|-------------------------------|
//! | `quake-pak`     | Quake, Quake II, Half-Life              | fixed count, header pointer   |
//! | `doom-wad`      | Doom engine                             | fixed count, header pointer   |
//! | `cri-afs`       | CRI middleware titles                   | fixed count, synthesized names|
//! | `gta-img2`      | GTA San Andreas                         | sector units                  |
//! | `nintendo-pfs0` | Nintendo Switch                         | two-pass name table           |
//! | `build-grp`     | Duke Nukem 3D, Shadow Warrior           | sequential offsets            |
//! | `ea-big`        | C&C Generals, FIFA                      | big-endian, C string names    |
//! | `westwood-pak`  | Dune II                                 | streaming, sort-diff lengths  |

use std::sync::LazyLock;

use gamearc_core::{FormatDescriptor, Limits, Registry, Result};

pub mod cri;
pub mod doom;
pub mod ea;
pub mod ken;
pub mod nintendo;
pub mod quake;
pub mod rockstar;
pub mod westwood;

#[cfg(test)]
mod testutil;

static BUILTIN: LazyLock<Registry> =
    LazyLock::new(|| registry(Limits::default()).unwrap_or_default());

/// All built-in descriptors, in registration order.
pub fn descriptors() -> Vec<FormatDescriptor> {
    vec![
        quake::descriptor(),
        doom::descriptor(),
        cri::descriptor(),
        rockstar::descriptor(),
        nintendo::descriptor(),
        ken::descriptor(),
        ea::descriptor(),
        westwood::descriptor(),
    ]
}

/// A registry of every built-in descriptor with custom limits.
pub fn registry(limits: Limits) -> Result<Registry> {
    let mut registry = Registry::new().with_limits(limits);
    for descriptor in descriptors() {
        registry.register(descriptor)?;
    }
    Ok(registry)
}

/// Process-wide registry with default limits.
pub fn builtin() -> &'static Registry {
    &BUILTIN
}
