//! Pricing service of a resource type
use std::fmt;

/// Services the downstream cost calculator knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Service {
    #[serde(rename = "AmazonEC2")]
    Ec2,
    #[serde(rename = "AmazonEBS")]
    Ebs,
    #[serde(rename = "AmazonRDS")]
    Rds,
    #[serde(rename = "AmazonS3")]
    S3,
    #[serde(rename = "AWSLambda")]
    Lambda,
    #[serde(rename = "AmazonVPC")]
    Vpc,
}

impl Service {
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "aws_instance" => Some(Service::Ec2),
            "aws_ebs_volume" => Some(Service::Ebs),
            "aws_db_instance" => Some(Service::Rds),
            "aws_s3_bucket" => Some(Service::S3),
            "aws_lambda_function" => Some(Service::Lambda),
            "aws_vpc" | "aws_subnet" | "aws_security_group" => Some(Service::Vpc),
            _ => None,
        }
    }

    pub fn service_code(&self) -> &'static str {
        match self {
            Service::Ec2 => "AmazonEC2",
            Service::Ebs => "AmazonEBS",
            Service::Rds => "AmazonRDS",
            Service::S3 => "AmazonS3",
            Service::Lambda => "AWSLambda",
            Service::Vpc => "AmazonVPC",
        }
    }

    /// `false` for services that are free of charge on their own
    pub fn is_priced(&self) -> bool {
        !matches!(self, Service::Vpc)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_code())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mapping() {
        assert_eq!(
            Service::from_resource_type("aws_instance"),
            Some(Service::Ec2)
        );
        assert_eq!(
            Service::from_resource_type("aws_subnet"),
            Some(Service::Vpc)
        );
        assert_eq!(Service::from_resource_type("aws_iam_role"), None);
        assert!(!Service::Vpc.is_priced());
        assert_eq!(Service::Lambda.to_string(), "AWSLambda");
        assert_eq!(
            serde_json::to_string(&Service::Rds).unwrap(),
            "\"AmazonRDS\""
        );
    }
}
