//! Encodes and decodes a small AMF3 object graph, with tracing enabled so
//! the codec's lifecycle/per-value logging is visible on stderr.

use amf_codec::{decode_amf3, encode_amf3, AmfObject, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("amf_codec=debug".parse()?),
        )
        .init();

    let mut obj = AmfObject::anonymous();
    obj.attrs.insert("name".into(), Value::String("torch".into()));
    obj.attrs.insert("count".into(), Value::Integer(3));

    let bytes = encode_amf3(&Value::object(obj))?;
    println!("encoded {} bytes", bytes.len());

    let decoded = decode_amf3(&bytes)?;
    println!("decoded: {:?}", decoded);

    Ok(())
}
