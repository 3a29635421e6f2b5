//! A phone running an OSC controller, end to end over loopback UDP.

use std::fs;
use std::net::UdpSocket;
use std::path::Path;
use std::time::Duration;

use csurf_core::config::Config;
use csurf_core::daw::{normalized_to_volume, Daw, OfflineDaw};
use csurf_core::ini::load_ini;
use csurf_core::integrator::Integrator;
use csurf_io::{build_pages, PortRegistry};
use rosc::{OscMessage, OscPacket, OscType};

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn free_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

#[test]
fn test_fader_move_reaches_the_track_and_echoes_back() {
    let dir = tempfile::tempdir().unwrap();
    let phone = UdpSocket::bind("127.0.0.1:0").unwrap();
    phone.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let surface_port = free_port();

    write(
        dir.path(),
        "CSI/CSI.ini",
        &format!(
            "Version 3.0\nOSCSurface Phone {} {} 127.0.0.1\nPage Main\nPhone 1 0 Phone.ost Phone PhoneFX\n",
            surface_port,
            phone.local_addr().unwrap().port()
        ),
    );
    write(
        dir.path(),
        "CSI/Surfaces/OSC/Phone.ost",
        "Widget Fader1\n    Control /1/fader1\n    FB_Processor /1/fader1\nWidgetEnd\n",
    );
    write(
        dir.path(),
        "CSI/Zones/Phone/Home.zon",
        "Zone Home\nIncludedZones\nTrack\nIncludedZonesEnd\nZoneEnd\n",
    );
    write(dir.path(), "CSI/Zones/Phone/Track.zon", "Zone Track\nFader| TrackVolume\nZoneEnd\n");

    let config = Config::embedded();
    let (ini, diagnostics) = load_ini(dir.path(), config.version_token()).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);

    let mut ports = PortRegistry::new("csurf-test");
    let (pages, report) = build_pages(&ini, dir.path(), &mut ports, &config);
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    let mut daw = OfflineDaw::new().with_resource_path(dir.path());
    let track = daw.add_track("Vox");
    let mut integrator = Integrator::new(Box::new(daw), config);
    for page in pages {
        integrator.add_page(page);
    }
    integrator.initialize();

    let packet = OscPacket::Message(OscMessage {
        addr: "/1/fader1".to_string(),
        args: vec![OscType::Float(0.5)],
    });
    phone
        .send_to(&rosc::encoder::encode(&packet).unwrap(), ("127.0.0.1", surface_port))
        .unwrap();

    let expected = normalized_to_volume(0.5);
    for _ in 0..200 {
        integrator.run();
        if (integrator.daw().track_volume(track) - expected).abs() < 1e-9 {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!((integrator.daw().track_volume(track) - expected).abs() < 1e-9);

    // zone activations arrive as `/Home` and `/Track` ahead of the feedback
    let mut buf = [0u8; 4096];
    let mut addresses = Vec::new();
    while let Ok((n, _)) = phone.recv_from(&mut buf) {
        if let Ok((_, OscPacket::Message(msg))) = rosc::decoder::decode_udp(&buf[..n]) {
            addresses.push(msg.addr);
        }
        if addresses.iter().any(|a| a == "/1/fader1") {
            break;
        }
    }
    assert!(addresses.contains(&"/Home".to_string()), "{:?}", addresses);
    assert!(addresses.contains(&"/1/fader1".to_string()), "{:?}", addresses);
}
