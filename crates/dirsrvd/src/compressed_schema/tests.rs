//! Tests for token issue, decoding, and persistence.

use std::fs;
use std::sync::Arc;
use std::thread;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use dirsrv_types::{Attribute, AttributeDescription};

use super::*;

struct SchemaDir {
    _dir: TempDir,
    path: Utf8PathBuf,
}

impl SchemaDir {
    fn open(&self) -> CompressedSchema {
        CompressedSchema::open(self.path.clone()).expect("schema should open")
    }

    fn backup(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.save", self.path))
    }
}

#[fixture]
fn schema_dir() -> SchemaDir {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    SchemaDir {
        path: root.join("config").join("compressed-schema"),
        _dir: dir,
    }
}

fn encode_attribute(schema: &CompressedSchema, attribute: &Attribute) -> Vec<u8> {
    let mut buffer = Vec::new();
    schema
        .encode_attribute(&mut buffer, attribute)
        .expect("attribute should encode");
    buffer
}

fn leading_token(encoded: &[u8]) -> Vec<u8> {
    ByteReader::new(encoded)
        .read_length_prefixed()
        .expect("token should frame")
        .to_vec()
}

fn names(classes: &[&str]) -> Vec<String> {
    classes.iter().map(|class| (*class).to_owned()).collect()
}

#[rstest]
#[case::single_plain_value(Attribute::from_strings("cn", ["Bob"]))]
#[case::multiple_values(Attribute::from_strings("mail", ["a@example.com", "b@example.com"]))]
#[case::with_options(Attribute::new(
    AttributeDescription::new("cn", ["lang-fr"]),
    vec![b"Robert".to_vec()],
))]
#[case::binary_value(Attribute::new(
    AttributeDescription::new("userCertificate", ["binary"]),
    vec![vec![0x30, 0x82, 0x00, 0xff]],
))]
#[case::no_values(Attribute::new(AttributeDescription::plain("description"), Vec::new()))]
fn attributes_round_trip(schema_dir: SchemaDir, #[case] attribute: Attribute) {
    let schema = schema_dir.open();
    let encoded = encode_attribute(&schema, &attribute);

    let mut reader = ByteReader::new(&encoded);
    let decoded = schema.decode_attribute(&mut reader).expect("decode");

    assert_eq!(decoded, attribute);
    assert!(reader.is_empty());
}

#[rstest]
fn object_class_sets_round_trip_in_original_order(schema_dir: SchemaDir) {
    let schema = schema_dir.open();
    let classes = names(&["top", "person", "inetOrgPerson"]);
    let mut buffer = Vec::new();
    schema
        .encode_object_classes(&mut buffer, &classes)
        .expect("encode");

    let decoded = schema
        .decode_object_classes(&mut ByteReader::new(&buffer))
        .expect("decode");

    assert_eq!(decoded, classes);
}

#[rstest]
fn same_description_reuses_token(schema_dir: SchemaDir) {
    let schema = schema_dir.open();
    let first = encode_attribute(&schema, &Attribute::from_strings("cn", ["a"]));
    let second = encode_attribute(&schema, &Attribute::from_strings("CN", ["b", "c"]));

    assert_eq!(leading_token(&first), leading_token(&second));
    assert_eq!(schema.attribute_token_count(), 1);
}

#[rstest]
fn option_order_does_not_change_token(schema_dir: SchemaDir) {
    let schema = schema_dir.open();
    let first = Attribute::new(AttributeDescription::new("cn", ["lang-fr", "binary"]), Vec::new());
    let second = Attribute::new(AttributeDescription::new("cn", ["Binary", "LANG-FR"]), Vec::new());

    assert_eq!(
        leading_token(&encode_attribute(&schema, &first)),
        leading_token(&encode_attribute(&schema, &second))
    );
}

#[rstest]
fn distinct_descriptions_get_distinct_tokens(schema_dir: SchemaDir) {
    let schema = schema_dir.open();
    let plain = encode_attribute(&schema, &Attribute::from_strings("cn", ["a"]));
    let tagged = encode_attribute(
        &schema,
        &Attribute::new(AttributeDescription::new("cn", ["lang-fr"]), Vec::new()),
    );
    let other = encode_attribute(&schema, &Attribute::from_strings("sn", ["a"]));

    let tokens = [leading_token(&plain), leading_token(&tagged), leading_token(&other)];
    assert_ne!(tokens[0], tokens[1]);
    assert_ne!(tokens[0], tokens[2]);
    assert_ne!(tokens[1], tokens[2]);
    assert_eq!(schema.attribute_token_count(), 3);
}

#[rstest]
fn object_class_sets_compare_case_insensitively(schema_dir: SchemaDir) {
    let schema = schema_dir.open();
    let mut first = Vec::new();
    let mut second = Vec::new();
    schema
        .encode_object_classes(&mut first, &names(&["top", "person"]))
        .expect("encode");
    schema
        .encode_object_classes(&mut second, &names(&["Person", "TOP"]))
        .expect("encode");

    assert_eq!(first, second);
    assert_eq!(schema.object_class_token_count(), 1);
}

#[rstest]
fn tokens_survive_restart(schema_dir: SchemaDir) {
    let attribute = Attribute::new(
        AttributeDescription::new("cn", ["lang-fr"]),
        vec![b"Robert".to_vec()],
    );
    let classes = names(&["top", "organizationalUnit"]);
    let (encoded_attribute, encoded_classes) = {
        let schema = schema_dir.open();
        let mut classes_buffer = Vec::new();
        schema
            .encode_object_classes(&mut classes_buffer, &classes)
            .expect("encode classes");
        (encode_attribute(&schema, &attribute), classes_buffer)
    };

    let reopened = schema_dir.open();

    assert_eq!(
        reopened
            .decode_attribute(&mut ByteReader::new(&encoded_attribute))
            .expect("decode after restart"),
        attribute
    );
    assert_eq!(
        reopened
            .decode_object_classes(&mut ByteReader::new(&encoded_classes))
            .expect("decode after restart"),
        classes
    );
}

#[rstest]
fn counters_continue_after_restart(schema_dir: SchemaDir) {
    let first_token = {
        let schema = schema_dir.open();
        leading_token(&encode_attribute(&schema, &Attribute::from_strings("cn", ["a"])))
    };

    let reopened = schema_dir.open();
    let second_token =
        leading_token(&encode_attribute(&reopened, &Attribute::from_strings("sn", ["b"])));

    assert_eq!(first_token, vec![1]);
    assert_eq!(second_token, vec![2]);
}

#[rstest]
fn unknown_token_is_a_hard_error(schema_dir: SchemaDir) {
    let schema = schema_dir.open();
    let mut buffer = Vec::new();
    write_length_prefixed(&mut buffer, &[0x7f]);
    write_length(&mut buffer, 0);

    let error = schema
        .decode_attribute(&mut ByteReader::new(&buffer))
        .expect_err("token was never issued");

    assert!(matches!(
        error,
        CompressedSchemaError::UnknownToken {
            space: KeySpace::AttributeDescription,
            ..
        }
    ));
    assert_eq!(
        error.to_string(),
        "unknown attribute-description token 7f"
    );
}

#[rstest]
fn missing_file_starts_empty(schema_dir: SchemaDir) {
    let schema = schema_dir.open();

    assert_eq!(schema.object_class_token_count(), 0);
    assert_eq!(schema.attribute_token_count(), 0);
    assert!(!schema_dir.path.exists());
}

#[rstest]
fn second_flush_leaves_backup_of_previous_file(schema_dir: SchemaDir) {
    let schema = schema_dir.open();
    encode_attribute(&schema, &Attribute::from_strings("cn", ["a"]));
    assert!(schema_dir.path.exists());
    assert!(!schema_dir.backup().exists());

    encode_attribute(&schema, &Attribute::from_strings("sn", ["b"]));

    assert!(schema_dir.backup().exists());
}

#[rstest]
fn recovers_from_backup_when_live_file_is_missing(schema_dir: SchemaDir) {
    let encoded = {
        let schema = schema_dir.open();
        let encoded = encode_attribute(&schema, &Attribute::from_strings("cn", ["a"]));
        encode_attribute(&schema, &Attribute::from_strings("sn", ["b"]));
        encoded
    };
    fs::remove_file(&schema_dir.path).expect("remove live file");

    let recovered = schema_dir.open();

    assert_eq!(
        recovered
            .decode_attribute(&mut ByteReader::new(&encoded))
            .expect("backup holds the first token"),
        Attribute::from_strings("cn", ["a"])
    );
}

#[rstest]
fn corrupt_file_is_reported(schema_dir: SchemaDir) {
    let parent = schema_dir.path.parent().expect("schema path has parent");
    fs::create_dir_all(parent).expect("create config dir");
    fs::write(&schema_dir.path, b"XXXX").expect("write garbage");

    let error = CompressedSchema::open(schema_dir.path.clone()).expect_err("header is wrong");

    assert!(matches!(error, CompressedSchemaError::Corrupt { .. }));
}

#[rstest]
fn concurrent_encoders_agree_on_one_token(schema_dir: SchemaDir) {
    let schema = Arc::new(schema_dir.open());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let schema = Arc::clone(&schema);
            thread::spawn(move || {
                let mut attribute_buffer = Vec::new();
                schema
                    .encode_attribute(
                        &mut attribute_buffer,
                        &Attribute::from_strings("uid", ["bob"]),
                    )
                    .expect("encode attribute");
                let mut class_buffer = Vec::new();
                schema
                    .encode_object_classes(&mut class_buffer, &names(&["top", "account"]))
                    .expect("encode classes");
                (attribute_buffer, class_buffer)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("encoder thread"))
        .collect();

    let (first_attribute, first_classes) = results.first().expect("at least one result");
    assert!(results.iter().all(|(attribute, classes)| {
        attribute == first_attribute && classes == first_classes
    }));
    assert_eq!(schema.attribute_token_count(), 1);
    assert_eq!(schema.object_class_token_count(), 1);

    let reopened = schema_dir.open();
    assert_eq!(reopened.attribute_token_count(), 1);
    assert_eq!(reopened.object_class_token_count(), 1);
}
