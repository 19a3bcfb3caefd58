//! Snapshot tests
//!
//! Evaluates each configuration in /tests/fixtures/ and compares a one line
//! summary per resource: address, region and the resolved attributes as json.

use std::path::PathBuf;
use tfexpand::{Engine, EngineConfig, Error, EvaluationError, ExpandedResource};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn evaluate(config: EngineConfig, name: &str) -> Result<Vec<ExpandedResource>, Error> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFEXPAND_LOG"))
        .with_writer(std::io::stderr)
        .try_init();

    Engine::new(config).evaluate_path(&fixture(name))
}

fn summary(resources: &[ExpandedResource]) -> String {
    resources
        .iter()
        .map(|resource| {
            format!(
                "{} {} {}",
                resource.address(),
                resource.resolved_region,
                serde_json::to_string(&resource.resolved_attributes).expect("serializable")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn counted() {
    let resources = evaluate(EngineConfig::new(10, 10), "counted").unwrap();

    insta::assert_snapshot!(summary(&resources), @r###"
    aws_instance.web[0] us-east-1 {"ami":"ami-0c55b159cbfafe1f0","instance_type":"t3.micro","root_block_device":[{"volume_size":20}],"tags":{"Name":"server-0"}}
    aws_instance.web[1] us-east-1 {"ami":"ami-0c55b159cbfafe1f0","instance_type":"t3.micro","root_block_device":[{"volume_size":20}],"tags":{"Name":"server-1"}}
    "###);
}

#[test]
fn counted_with_var_file() {
    let variables =
        tfexpand::config::load_var_file(&fixture("counted").join("prod.tfvars")).unwrap();
    let resources = evaluate(
        EngineConfig::new(10, 10).with_variables(variables),
        "counted/main.tf",
    )
    .unwrap();

    let ids: Vec<_> = resources.iter().map(|r| r.logical_id.as_str()).collect();
    assert_eq!(ids, vec!["web[0]", "web[1]", "web[2]"]);
}

#[test]
fn counted_over_limit() {
    let error = evaluate(EngineConfig::new(1, 10), "counted").expect_err("must fail");

    insta::assert_snapshot!(error.to_string(), @"aws_instance.web requests 2 instances, exceeding the limit of 1");
    assert!(matches!(
        error,
        Error::Evaluation(EvaluationError::ExpansionLimitExceeded { .. })
    ));
}

#[test]
fn for_each() {
    let resources = evaluate(EngineConfig::new(10, 10), "for_each").unwrap();

    insta::assert_snapshot!(summary(&resources), @r###"
    aws_s3_bucket.bucket["logs"] eu-west-1 {"bucket":"acme-dev-logs","storage_class":"STANDARD_IA"}
    aws_s3_bucket.bucket["assets"] eu-west-1 {"bucket":"acme-dev-assets","storage_class":"STANDARD"}
    "###);
}

#[test]
fn conditional() {
    let resources = evaluate(EngineConfig::new(10, 10), "conditional").unwrap();

    insta::assert_snapshot!(summary(&resources), @r###"
    aws_instance.app us-west-2 {"instance_type":"t3.micro","availability_zone":"us-west-2a"}
    "###);

    let resources = evaluate(
        EngineConfig::new(10, 10)
            .with_variable("create_database", true)
            .with_variable("environment", "prod"),
        "conditional",
    )
    .unwrap();

    insta::assert_snapshot!(summary(&resources), @r###"
    aws_db_instance.main[0] us-east-1 {"instance_class":"db.t3.micro","region":"us-east-1"}
    aws_instance.app us-west-2 {"instance_type":"m5.large","availability_zone":"us-west-2a"}
    "###);
}

#[test]
fn modules() {
    let resources = evaluate(EngineConfig::new(10, 10), "modules").unwrap();

    insta::assert_snapshot!(summary(&resources), @r###"
    aws_instance.bastion us-west-2 {"instance_type":"t3.nano"}
    module.network.aws_vpc.main us-west-2 {"cidr_block":"10.0.0.0/16"}
    module.network.aws_subnet.private["a"] us-west-2 {"availability_zone":"us-west-2a"}
    module.network.aws_subnet.private["b"] us-west-2 {"availability_zone":"us-west-2b"}
    "###);
}

#[test]
fn module_depth() {
    let error = evaluate(EngineConfig::new(10, 10).with_max_module_depth(0), "modules")
        .expect_err("must fail");

    insta::assert_snapshot!(error.to_string(), @"module `network`: nesting exceeds the maximum module depth of 0");
}

#[test]
fn serialized_output() {
    let resources = evaluate(EngineConfig::new(10, 10), "for_each").unwrap();

    insta::assert_snapshot!(serde_json::to_string_pretty(&resources[0]).unwrap(), @r###"
    {
      "logical_id": "bucket[\"logs\"]",
      "resource_type": "aws_s3_bucket",
      "physical_index": "logs",
      "resolved_attributes": {
        "bucket": "acme-dev-logs",
        "storage_class": "STANDARD_IA"
      },
      "resolved_region": "eu-west-1"
    }
    "###);
}
