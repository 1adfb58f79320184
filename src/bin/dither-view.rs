//! `dither-view [model.glb[,part.glb...]] [environment.hdr]`
//!
//! Shows the model (or a cube when none is given or it fails to load) through
//! the dithering pass. Comma-separated files load as one model. Keys: 1/2/3
//! visibility, P post-processing, O original colours, T theme, V/L/G named
//! palettes, C single colour, [ ] 0 dot size (or the wheel), R render scale,
//! B brighten dark materials, A animate dither, Space auto-rotation. Drop a
//! file on the window to load it.

use dither_ngin::flow::{ViewerConfig, run};

fn main() -> anyhow::Result<()> {
    let config = ViewerConfig::from_args(std::env::args().skip(1));
    run(config)
}
