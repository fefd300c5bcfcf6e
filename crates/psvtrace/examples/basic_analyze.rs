use psvtrace::{
    CalibrationMarkers, ImageInputs, OutputConfig, PsvAnalyzer, PsvConfig, RefPoint, Roi,
    VelocityScale,
};
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 5 {
        eprintln!(
            "Usage: {} <image.jpg> <x0,y0,x1,y1> <v_bottom> <v_top> [out_dir]",
            args[0]
        );
        std::process::exit(2);
    }

    let coords: Vec<i64> = args[2]
        .split(',')
        .map(|s| s.trim().parse())
        .collect::<Result<_, _>>()?;
    if coords.len() != 4 {
        return Err("roi must be x0,y0,x1,y1".into());
    }
    let roi = Roi::new(coords[0], coords[1], coords[2], coords[3]);
    let v_bottom: f64 = args[3].parse()?;
    let v_top: f64 = args[4].parse()?;

    let inputs = ImageInputs {
        roi,
        markers: CalibrationMarkers {
            // time in ROI-relative columns
            time: [
                RefPoint::new(roi.x0 as f64, 0.0),
                RefPoint::new(roi.x0 as f64 + 1.0, 1.0),
            ],
            velocity: VelocityScale::RegionExtent {
                bottom: v_bottom,
                top: v_top,
            },
        },
    };

    let analyzer = PsvAnalyzer::new(PsvConfig::default());
    let analysis = analyzer.analyze_file(Path::new(&args[1]), &inputs)?;
    let report = &analysis.report;

    println!("Detected {} peaks.", report.peaks.len());
    for m in &report.measurements {
        println!("  cycle {}: column {} psv {:.2}", m.cycle, m.column, m.velocity);
    }

    if let Some(out_dir) = args.get(5) {
        let out_dir = Path::new(out_dir);
        std::fs::create_dir_all(out_dir)?;
        let output = OutputConfig {
            save_cropped: false,
            write_json: true,
        };
        let written = psvtrace::write_artifacts(out_dir, "png", &analysis, &output)?;
        for p in written {
            println!("Wrote {}", p.display());
        }
    }
    Ok(())
}
