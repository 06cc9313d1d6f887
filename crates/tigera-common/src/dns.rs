//! Service DNS names

/// Cluster domain used when none is configured
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// All names a Service can be reached by from inside the cluster
///
/// ```
/// use tigera_common::dns::service_dns_names;
///
/// let names = service_dns_names("tigera-manager", "tigera-manager", "cluster.local");
/// assert_eq!(names.last().map(String::as_str),
///            Some("tigera-manager.tigera-manager.svc.cluster.local"));
/// ```
pub fn service_dns_names(service: &str, namespace: &str, cluster_domain: &str) -> Vec<String> {
    vec![
        service.to_string(),
        format!("{service}.{namespace}"),
        format!("{service}.{namespace}.svc"),
        format!("{service}.{namespace}.svc.{cluster_domain}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_in_order_of_qualification() {
        assert_eq!(
            service_dns_names("tigera-linseed", "tigera-elasticsearch", "corp.internal"),
            vec![
                "tigera-linseed",
                "tigera-linseed.tigera-elasticsearch",
                "tigera-linseed.tigera-elasticsearch.svc",
                "tigera-linseed.tigera-elasticsearch.svc.corp.internal",
            ]
        );
    }
}
