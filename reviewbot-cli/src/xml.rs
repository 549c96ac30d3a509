//! Decoding of the XML documents served by the build service API.
//!
//! The wire structs are private; callers get the domain types from
//! `reviewbot_core`. Unknown elements and attributes are ignored.

use reviewbot_core::{
    Action, ActionKind, Fingerprint, HistoryEntry, LinkTarget, PackageOwner, Request,
    RequestState, Review, ReviewState, ReviewerTarget, ServiceError,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

fn decode<T: DeserializeOwned>(operation: &'static str, text: &str) -> Result<T, ServiceError> {
    quick_xml::de::from_str(text).map_err(|e| ServiceError::malformed(operation, e.to_string()))
}

#[derive(Debug, Deserialize)]
struct XmlSourceInfo {
    #[serde(rename = "@verifymd5", default)]
    verifymd5: Option<String>,
}

/// `verifymd5` of a `<sourceinfo>` document.
pub fn parse_source_info(text: &str) -> Result<Option<Fingerprint>, ServiceError> {
    let info: XmlSourceInfo = decode("source info", text)?;
    Ok(info.verifymd5.map(Fingerprint::from))
}

#[derive(Debug, Deserialize)]
struct XmlDirectory {
    #[serde(default)]
    linkinfo: Option<XmlLinkInfo>,
}

#[derive(Debug, Deserialize)]
struct XmlLinkInfo {
    #[serde(rename = "@project", default)]
    project: Option<String>,
    #[serde(rename = "@package", default)]
    package: Option<String>,
}

/// Link target from the `<linkinfo>` of a source directory listing.
///
/// A link without a project attribute points into `project`.
pub fn parse_link_target(text: &str, project: &str) -> Result<Option<LinkTarget>, ServiceError> {
    let directory: XmlDirectory = decode("source listing", text)?;
    let Some(linkinfo) = directory.linkinfo else {
        return Ok(None);
    };
    let Some(package) = linkinfo.package else {
        return Err(ServiceError::malformed(
            "source listing",
            "linkinfo without package",
        ));
    };
    let project = linkinfo.project.unwrap_or_else(|| project.to_string());
    Ok(Some(LinkTarget::new(project, package)))
}

#[derive(Debug, Deserialize)]
struct XmlRevisionList {
    #[serde(rename = "revision", default)]
    revisions: Vec<XmlRevision>,
}

#[derive(Debug, Deserialize)]
struct XmlRevision {
    #[serde(rename = "@rev")]
    rev: String,
    #[serde(default)]
    srcmd5: Option<String>,
}

/// Entries of a `<revisionlist>`, newest first.
pub fn parse_history(text: &str) -> Result<Vec<HistoryEntry>, ServiceError> {
    let list: XmlRevisionList = decode("history", text)?;
    Ok(list
        .revisions
        .into_iter()
        .rev()
        .map(|revision| HistoryEntry {
            revision: revision.rev,
            fingerprint: revision.srcmd5.map(Fingerprint::from),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct XmlRequest {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@creator", default)]
    creator: Option<String>,
    #[serde(rename = "action", default)]
    actions: Vec<XmlAction>,
    state: XmlState,
    #[serde(rename = "review", default)]
    reviews: Vec<XmlReview>,
}

#[derive(Debug, Deserialize)]
struct XmlAction {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(default)]
    source: Option<XmlEndpoint>,
    #[serde(default)]
    target: Option<XmlEndpoint>,
}

#[derive(Debug, Deserialize)]
struct XmlEndpoint {
    #[serde(rename = "@project", default)]
    project: Option<String>,
    #[serde(rename = "@package", default)]
    package: Option<String>,
    #[serde(rename = "@rev", default)]
    rev: Option<String>,
    #[serde(rename = "@releaseproject", default)]
    releaseproject: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlState {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct XmlReview {
    #[serde(rename = "@state")]
    state: String,
    #[serde(rename = "@by_user", default)]
    by_user: Option<String>,
    #[serde(rename = "@by_group", default)]
    by_group: Option<String>,
    #[serde(rename = "@by_project", default)]
    by_project: Option<String>,
    #[serde(rename = "@by_package", default)]
    by_package: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

impl XmlAction {
    fn into_action(self) -> Action {
        let mut action = Action::new(ActionKind::from_api_name(&self.kind));
        if let Some(source) = self.source {
            action.source_project = source.project;
            action.source_package = source.package;
            action.source_revision = source.rev;
        }
        if let Some(target) = self.target {
            action.target_project = target.project;
            action.target_package = target.package;
            action.target_release_project = target.releaseproject;
        }
        action
    }
}

impl XmlReview {
    fn target(&self) -> Option<ReviewerTarget> {
        if let Some(user) = &self.by_user {
            return Some(ReviewerTarget::User(user.clone()));
        }
        if let Some(group) = &self.by_group {
            return Some(ReviewerTarget::Group(group.clone()));
        }
        match (&self.by_project, &self.by_package) {
            (Some(project), Some(package)) => Some(ReviewerTarget::Package {
                project: project.clone(),
                package: package.clone(),
            }),
            (Some(project), None) => Some(ReviewerTarget::Project(project.clone())),
            _ => None,
        }
    }
}

impl XmlRequest {
    fn into_request(self) -> Result<Request, ServiceError> {
        let state: RequestState = self
            .state
            .name
            .parse()
            .map_err(|e: reviewbot_core::UnknownState| {
                ServiceError::malformed("request", format!("request {}: {}", self.id, e))
            })?;

        let mut request = Request::new(self.id, state);
        request.creator = self.creator;
        request.actions = self.actions.into_iter().map(XmlAction::into_action).collect();

        for review in self.reviews {
            let Some(target) = review.target() else {
                warn!("request {}: review without reviewer skipped", request.id);
                continue;
            };
            let state = match review.state.parse::<ReviewState>() {
                Ok(state) => state,
                Err(e) => {
                    warn!("request {}: review by {} skipped: {}", request.id, target, e);
                    continue;
                }
            };
            let mut entry = Review::new(target, state);
            entry.message = review.comment;
            request.reviews.push(entry);
        }

        Ok(request)
    }
}

/// A single `<request>` document.
pub fn parse_request(text: &str) -> Result<Request, ServiceError> {
    let request: XmlRequest = decode("request", text)?;
    request.into_request()
}

#[derive(Debug, Deserialize)]
struct XmlRequestCollection {
    #[serde(rename = "request", default)]
    requests: Vec<XmlRequest>,
}

/// A `<collection>` of requests, as returned by request listings and searches.
pub fn parse_request_collection(text: &str) -> Result<Vec<Request>, ServiceError> {
    let collection: XmlRequestCollection = decode("request list", text)?;
    collection
        .requests
        .into_iter()
        .map(XmlRequest::into_request)
        .collect()
}

#[derive(Debug, Deserialize)]
struct XmlOwnerCollection {
    #[serde(rename = "owner", default)]
    owners: Vec<XmlOwner>,
}

#[derive(Debug, Deserialize)]
struct XmlOwner {
    #[serde(rename = "@project")]
    project: String,
    #[serde(rename = "@package", default)]
    package: Option<String>,
    #[serde(rename = "person", default)]
    persons: Vec<XmlPerson>,
}

#[derive(Debug, Deserialize)]
struct XmlPerson {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@role", default)]
    role: Option<String>,
}

/// Owners from an owner search, keeping only persons with the maintainer role.
pub fn parse_owners(text: &str) -> Result<Vec<PackageOwner>, ServiceError> {
    let collection: XmlOwnerCollection = decode("owner search", text)?;
    Ok(collection
        .owners
        .into_iter()
        .map(|owner| PackageOwner {
            project: owner.project,
            package: owner.package,
            maintainers: owner
                .persons
                .into_iter()
                .filter(|person| person.role.as_deref() == Some("maintainer"))
                .map(|person| person.name)
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"
<request id="250866" creator="alice">
  <action type="maintenance_incident">
    <source project="home:alice:branches:vim" package="vim" rev="4"/>
    <target project="openSUSE:Maintenance" releaseproject="openSUSE:13.2:Update"/>
  </action>
  <action type="submit">
    <source project="editors" package="vim" rev="b5e0f"/>
    <target project="openSUSE:Factory" package="vim"/>
  </action>
  <state name="review" who="alice" when="2014-11-04T10:00:00">
    <comment/>
  </state>
  <review state="new" by_user="factory-auto"/>
  <review state="accepted" by_group="legal-auto" who="licensedigger">
    <comment>ok</comment>
  </review>
  <review state="new" by_project="editors" by_package="vim"/>
  <history who="alice" when="2014-11-04T10:00:00">
    <description>Request created</description>
  </history>
  <description>update vim</description>
</request>
"#;

    #[test]
    fn test_parse_request() {
        let request = parse_request(REQUEST).unwrap();

        assert_eq!(request.id.0, "250866");
        assert_eq!(request.creator.as_deref(), Some("alice"));
        assert_eq!(request.state, RequestState::Review);
        assert_eq!(request.actions.len(), 2);

        let incident = &request.actions[0];
        assert_eq!(incident.kind, ActionKind::Incident);
        assert_eq!(incident.source_revision.as_deref(), Some("4"));
        assert_eq!(incident.target_package, None);
        assert_eq!(
            incident.target_release_project.as_deref(),
            Some("openSUSE:13.2:Update")
        );

        let submit = &request.actions[1];
        assert_eq!(submit.kind, ActionKind::Submit);
        assert_eq!(submit.target_package.as_deref(), Some("vim"));

        assert_eq!(request.review_state_for_user("factory-auto"), Some(ReviewState::New));
        assert_eq!(request.reviews[1].message.as_deref(), Some("ok"));
        assert_eq!(
            request.reviews[2].by,
            ReviewerTarget::Package {
                project: "editors".to_string(),
                package: "vim".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_review_state_is_skipped() {
        let text = r#"<request id="1"><state name="review"/>
            <review state="obsoleted" by_user="bob"/>
            <review state="new" by_user="factory-auto"/></request>"#;

        let request = parse_request(text).unwrap();
        assert_eq!(request.reviews.len(), 1);
    }

    #[test]
    fn test_unknown_request_state_is_malformed() {
        let text = r#"<request id="1"><state name="exploded"/></request>"#;
        let err = parse_request(text).unwrap_err();
        assert!(matches!(err, ServiceError::Malformed { .. }));
    }

    #[test]
    fn test_parse_collection() {
        let text = format!(r#"<collection matches="1">{}</collection>"#, REQUEST);
        let requests = parse_request_collection(&text).unwrap();
        assert_eq!(requests.len(), 1);

        let empty = parse_request_collection(r#"<collection matches="0"/>"#).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_parse_source_info() {
        let text = r#"<sourceinfo package="vim" rev="12" vrev="1"
            srcmd5="aaa" verifymd5="0a1b2c3d4e5f"><filename>vim.spec</filename></sourceinfo>"#;
        assert_eq!(
            parse_source_info(text).unwrap(),
            Some(Fingerprint::from("0a1b2c3d4e5f"))
        );
    }

    #[test]
    fn test_parse_link_target() {
        let text = r#"<directory name="vim.openSUSE_13.2_Update" rev="3">
            <linkinfo project="openSUSE:13.2:Update" package="vim" srcmd5="x"/>
            <entry name="_link" md5="y" size="120"/>
        </directory>"#;
        assert_eq!(
            parse_link_target(text, "openSUSE:Maintenance:1234").unwrap(),
            Some(LinkTarget::new("openSUSE:13.2:Update", "vim"))
        );

        let same_project = r#"<directory name="vim"><linkinfo package="vim-base"/></directory>"#;
        assert_eq!(
            parse_link_target(same_project, "editors").unwrap(),
            Some(LinkTarget::new("editors", "vim-base"))
        );

        let plain = r#"<directory name="vim"><entry name="vim.spec"/></directory>"#;
        assert_eq!(parse_link_target(plain, "editors").unwrap(), None);
    }

    #[test]
    fn test_parse_history_newest_first() {
        let text = r#"<revisionlist>
            <revision rev="1" vrev="1"><srcmd5>aaa</srcmd5><version>7.4</version></revision>
            <revision rev="2" vrev="2"><srcmd5>bbb</srcmd5><version>7.4</version></revision>
        </revisionlist>"#;

        let history = parse_history(text).unwrap();
        assert_eq!(history[0].revision, "2");
        assert_eq!(history[0].fingerprint, Some(Fingerprint::from("bbb")));
        assert_eq!(history[1].revision, "1");
    }

    #[test]
    fn test_parse_owners_keeps_maintainers() {
        let text = r#"<collection>
            <owner rootproject="openSUSE:Factory" project="editors" package="vim">
              <person name="alice" role="maintainer"/>
              <person name="bob" role="bugowner"/>
              <group name="vim-team" role="maintainer"/>
            </owner>
            <owner rootproject="openSUSE:Factory" project="Base:System">
              <person name="carol" role="maintainer"/>
            </owner>
        </collection>"#;

        let owners = parse_owners(text).unwrap();
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].package.as_deref(), Some("vim"));
        assert_eq!(owners[0].maintainers, vec!["alice".to_string()]);
        assert_eq!(owners[1].package, None);
        assert_eq!(owners[1].maintainers, vec!["carol".to_string()]);
    }

    #[test]
    fn test_revision_without_rev_is_malformed() {
        let text = r#"<revisionlist><revision vrev="1"><srcmd5>aaa</srcmd5></revision></revisionlist>"#;
        let err = parse_history(text).unwrap_err();
        assert!(matches!(err, ServiceError::Malformed { .. }));
    }
}
