use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Statistical test used to rank genes between groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Wilcoxon,
    #[serde(rename = "t-test")]
    TTest,
    LogReg,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Wilcoxon, Method::TTest, Method::LogReg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Wilcoxon => "wilcoxon",
            Method::TTest => "t-test",
            Method::LogReg => "logreg",
        }
    }

    /// Whether the method yields p-values.
    pub fn has_pvals(&self) -> bool {
        !matches!(self, Method::LogReg)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Method, Error> {
        match s {
            "wilcoxon" => Ok(Method::Wilcoxon),
            "t-test" => Ok(Method::TTest),
            "logreg" => Ok(Method::LogReg),
            _ => bail!("unknown method {:?}, expected one of wilcoxon, t-test, logreg", s),
        }
    }
}

/// What each group is compared against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reference {
    /// All observations outside the group
    Rest,
    /// A single named group
    Group(String),
}

impl Reference {
    pub const REST: &'static str = "rest";
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Rest => f.write_str(Reference::REST),
            Reference::Group(g) => f.write_str(g),
        }
    }
}

/// The string "rest" always means [`Reference::Rest`]; a group literally named "rest" has to be
/// given as `Reference::Group`.
impl From<&str> for Reference {
    fn from(s: &str) -> Reference {
        if s == Reference::REST {
            Reference::Rest
        } else {
            Reference::Group(s.to_string())
        }
    }
}

/// Ranked genes for one group, every vector ordered by decreasing score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRanking {
    pub group: String,
    pub names: Vec<String>,
    pub scores: Vec<f64>,
    pub logfoldchanges: Vec<f64>,
    pub pvals: Option<Vec<f64>>,
    pub pvals_adj: Option<Vec<f64>>,
}

impl GroupRanking {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names of the `n` best ranked genes.
    pub fn top(&self, n: usize) -> &[String] {
        &self.names[..n.min(self.names.len())]
    }
}

/// Output of a differential expression run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankGenesResult {
    pub groupby: String,
    pub reference: Reference,
    pub method: Method,
    pub groups: Vec<GroupRanking>,
}

impl RankGenesResult {
    pub fn group(&self, name: &str) -> Option<&GroupRanking> {
        self.groups.iter().find(|g| g.group == name)
    }
}
