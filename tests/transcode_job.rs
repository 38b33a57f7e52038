use std::path::PathBuf;

use titlemap::{TranscodeArgs, TranscodeJob};

fn job() -> TranscodeJob {
    TranscodeJob::new(
        PathBuf::from("/usr/bin/HandBrakeCLI"),
        "/videos/disc1.dvdmedia",
        "/out/Alien (1979)-123456.m4v",
    )
}

#[test]
fn test_build_args_input_output_only() {
    assert_eq!(
        job().build_args(),
        vec![
            "--input",
            "/videos/disc1.dvdmedia",
            "--output",
            "/out/Alien (1979)-123456.m4v",
        ]
    );
}

#[test]
fn test_build_args_from_title_column() {
    let (record, _) = titlemap::parse(
        "disc1 | --title 2 --subtitle scan --aencoder ca_aac | Alien (1979)",
    );
    let args = TranscodeArgs::default()
        .with(record.transcode_arguments().unwrap())
        .unwrap();
    assert_eq!(
        job().args(args).build_args(),
        vec![
            "--input",
            "/videos/disc1.dvdmedia",
            "--output",
            "/out/Alien (1979)-123456.m4v",
            "--title",
            "2",
            "--subtitle",
            "scan",
            "--aencoder",
            "ca_aac",
        ]
    );
}

#[test]
fn test_args_replace_previous() {
    let first = TranscodeArgs {
        preset: Some("Fast 1080p30".into()),
        ..TranscodeArgs::default()
    };
    let second = TranscodeArgs {
        encoder: Some("x265".into()),
        ..TranscodeArgs::default()
    };
    let args = job().args(first).args(second).build_args();
    assert!(!args.contains(&"--preset".to_string()));
    assert!(args.contains(&"x265".to_string()));
}
