use topsprod::io::raster_files::{load_phase, load_water_mask};
use topsprod::io::vrt::{render_raw_vrt, VrtBand};
use topsprod::io::{read_image_xml, DataType, Endianness, Interleave};
use topsprod::types::{GeoGrid, IfgComplex, ProductError};

const FLAT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<imageFile>
    <property name="access_mode"><value>read</value></property>
    <property name="byte_order"><value>b</value></property>
    <property name="data_type"><value>CFLOAT</value></property>
    <property name="file_name"><value>filt_topophase.flat.geo</value></property>
    <property name="length"><value>2</value></property>
    <property name="number_bands"><value>1</value></property>
    <property name="scheme"><value>BIP</value></property>
    <property name="width"><value>3</value></property>
    <component name="coordinate1">
        <factorymodule>isceobj.Image</factorymodule>
        <property name="delta"><value>0.0008333333333333334</value></property>
        <property name="endingvalue"><value>-117.9975</value></property>
        <property name="size"><value>3</value></property>
        <property name="startingvalue"><value>-118.0</value></property>
    </component>
    <component name="coordinate2">
        <property name="delta"><value>-0.0008333333333333334</value></property>
        <property name="size"><value>2</value></property>
        <property name="startingvalue"><value>35.0</value></property>
    </component>
</imageFile>
"#;

#[test]
fn test_big_endian_phase_from_isce_xml() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();

    let mut raw = Vec::new();
    for k in 0..6 {
        raw.extend_from_slice(&(k as f32).to_be_bytes());
        raw.extend_from_slice(&(-(k as f32)).to_be_bytes());
    }
    std::fs::write(dir.path().join("filt_topophase.flat.geo"), raw).unwrap();
    let xml = dir.path().join("filt_topophase.flat.geo.xml");
    std::fs::write(&xml, FLAT_XML).unwrap();

    let header = read_image_xml(&xml).unwrap();
    assert_eq!(header.byte_order, Endianness::Big);
    assert_eq!(header.scheme, Interleave::Bip);
    assert_eq!(header.data_type, DataType::CFloat);

    let phase = load_phase(&xml).unwrap();
    assert_eq!(phase.shape(), (2, 3));
    assert_eq!(phase.band(0)[[1, 2]], IfgComplex::new(5.0, -5.0));
    assert_eq!(phase.grid.origin_lat, 35.0);
}

#[test]
fn test_phase_file_cannot_be_a_water_mask() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("filt_topophase.flat.geo"), vec![0u8; 48]).unwrap();
    let xml = dir.path().join("filt_topophase.flat.geo.xml");
    std::fs::write(&xml, FLAT_XML).unwrap();

    assert!(matches!(load_water_mask(&xml), Err(ProductError::InvalidFormat(_))));
}

#[test]
fn test_bsq_vrt_offsets() {
    let header = topsprod::io::ImageHeader {
        file_name: "masked".into(),
        width: 10,
        length: 5,
        bands: 2,
        data_type: DataType::Float,
        scheme: Interleave::Bsq,
        byte_order: Endianness::Little,
        grid: Some(GeoGrid::new(0.0, 0.0, 1.0, -1.0, 10, 5)),
    };
    let vrt = render_raw_vrt(&header, "masked", &[VrtBand { source_band: 1, nodata: Some(-10.0) }]).unwrap();
    assert!(vrt.contains("<ImageOffset>200</ImageOffset>"));
    assert!(vrt.contains("<PixelOffset>4</PixelOffset>"));
    assert!(vrt.contains("<LineOffset>40</LineOffset>"));
    assert!(vrt.contains(r#"relativeToVRT="1""#));
}
