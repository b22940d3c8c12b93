//! The locale network.
//!
//! Locales are linked by pairs of directed connections, one in each direction.
//! Each connection carries two normalized weights: `w` (inverse distance) and
//! `gw` (gravity, population product over squared distance). After
//! `reweight`, the outbound `w` of every locale sums to one, and likewise `gw`.
//!
//! Outbound connections are kept in insertion order, which fixes the order
//! used by cumulative-weight neighbor selection.
use std::path::Path;

use rand::Rng;
use serde_derive::Deserialize;

use crate::error::BranchingError;
use crate::locale::{Locale, LocaleId};
use crate::log::{debug, trace};
use crate::parameters::{NetworkSetup, Weighting};
use crate::random::{gamma, uniform};
use crate::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub from: LocaleId,
    pub to: LocaleId,
    pub distance: f64,
    pub w: f64,
    pub gw: f64,
    /// The lower of the two endpoints' flow rates.
    pub flow_rate: f64,
}

impl Connection {
    #[must_use]
    pub fn weight(&self, weighting: Weighting) -> f64 {
        match weighting {
            Weighting::Distance => self.w,
            Weighting::Gravity => self.gw,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Network {
    locales: Vec<Locale>,
    connections: Vec<Connection>,
    /// Indices into `connections`, per locale, in insertion order.
    outbound: Vec<Vec<usize>>,
    names: HashMap<String, LocaleId>,
}

#[derive(Deserialize)]
struct LocaleRecord {
    name: String,
    population: u64,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

#[derive(Deserialize)]
struct LinkRecord {
    from: String,
    to: String,
    #[serde(default)]
    distance: Option<f64>,
}

impl Network {
    #[must_use]
    pub fn new() -> Network {
        Network::default()
    }

    /// Builds the network described by `setup` and normalizes its weights.
    ///
    /// # Errors
    ///
    /// Returns a `BranchingError` if a table cannot be read, or `NetworkError` if the
    /// network is malformed or leaves a locale without connections.
    pub fn build<R: Rng + ?Sized>(
        rng: &mut R,
        setup: &NetworkSetup,
    ) -> Result<Network, BranchingError> {
        let mut network = match setup {
            NetworkSetup::Isolated { name, population } => {
                let mut network = Network::new();
                network.add_locale(name.clone(), *population, 0.0, 0.0)?;
                network
            }
            NetworkSetup::Random {
                locales,
                total_population,
                population_cv,
                edges_per_locale,
                extent,
            } => Network::random(
                rng,
                *locales,
                *total_population,
                *population_cv,
                *edges_per_locale,
                *extent,
            )?,
            NetworkSetup::Table {
                locales_file,
                edges_file,
                max_distance,
            } => Network::from_tables(locales_file, edges_file.as_deref(), *max_distance)?,
        };
        // A lone locale has nowhere to send infections and nothing to normalize.
        if network.len() > 1 {
            network.reweight()?;
        }
        debug!(
            "built network with {} locales and {} links",
            network.len(),
            network.link_count()
        );
        Ok(network)
    }

    /// Adds a locale and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if a locale with the same name already exists.
    pub fn add_locale(
        &mut self,
        name: String,
        population: u64,
        x: f64,
        y: f64,
    ) -> Result<LocaleId, BranchingError> {
        if self.names.contains_key(&name) {
            return Err(BranchingError::NetworkError(format!(
                "duplicate locale name {name}"
            )));
        }
        let id = LocaleId(self.locales.len());
        self.names.insert(name.clone(), id);
        self.locales.push(Locale::new(id, name, population, x, y));
        self.outbound.push(Vec::new());
        Ok(id)
    }

    /// Links two locales with a connection in each direction. Weights are
    /// unnormalized until `reweight` runs.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` for a self link, a distance that is not positive and
    /// finite, or a link that already exists.
    pub fn add_link(
        &mut self,
        a: LocaleId,
        b: LocaleId,
        distance: f64,
    ) -> Result<(), BranchingError> {
        if a == b {
            return Err(BranchingError::NetworkError(format!(
                "cannot link locale {a} to itself"
            )));
        }
        if distance.is_nan() || distance.is_infinite() || distance <= 0.0 {
            return Err(BranchingError::NetworkError(format!(
                "invalid distance {distance} between locales {a} and {b}"
            )));
        }
        if self.has_link(a, b) {
            return Err(BranchingError::NetworkError(format!(
                "locales {a} and {b} are already linked"
            )));
        }
        trace!("linking locales {a} and {b} at distance {distance}");
        for (from, to) in [(a, b), (b, a)] {
            let flow_rate = self.locales[from.0]
                .flow_rate
                .min(self.locales[to.0].flow_rate);
            self.outbound[from.0].push(self.connections.len());
            self.connections.push(Connection {
                from,
                to,
                distance,
                w: 0.0,
                gw: 0.0,
                flow_rate,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn has_link(&self, a: LocaleId, b: LocaleId) -> bool {
        self.connection(a, b).is_some()
    }

    #[must_use]
    pub fn connection(&self, from: LocaleId, to: LocaleId) -> Option<&Connection> {
        self.outbound(from).find(|connection| connection.to == to)
    }

    /// Outbound connections of `from`, in insertion order.
    pub fn outbound(&self, from: LocaleId) -> impl Iterator<Item = &Connection> + '_ {
        self.outbound[from.0]
            .iter()
            .map(move |&index| &self.connections[index])
    }

    #[must_use]
    pub fn degree(&self, id: LocaleId) -> usize {
        self.outbound[id.0].len()
    }

    /// Number of undirected links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.connections.len() / 2
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locales.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locales.is_empty()
    }

    #[must_use]
    pub fn locales(&self) -> &[Locale] {
        &self.locales
    }

    pub fn locales_mut(&mut self) -> &mut [Locale] {
        &mut self.locales
    }

    #[must_use]
    pub fn locale(&self, id: LocaleId) -> &Locale {
        &self.locales[id.0]
    }

    pub fn locale_mut(&mut self, id: LocaleId) -> &mut Locale {
        &mut self.locales[id.0]
    }

    #[must_use]
    pub fn locale_id(&self, name: &str) -> Option<LocaleId> {
        self.names.get(name).copied()
    }

    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    #[must_use]
    pub fn total_population(&self) -> u64 {
        self.locales.iter().map(|locale| locale.pop0).sum()
    }

    /// Normalizes the outbound `w` and `gw` of every locale to sum to one.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if any locale has no outbound connections.
    #[allow(clippy::cast_precision_loss)]
    pub fn reweight(&mut self) -> Result<(), BranchingError> {
        for (index, outbound) in self.outbound.iter().enumerate() {
            if outbound.is_empty() {
                return Err(BranchingError::NetworkError(format!(
                    "locale {} has no connections",
                    self.locales[index].name
                )));
            }
            let mut w_total = 0.0;
            let mut gw_total = 0.0;
            for &c in outbound {
                let connection = &mut self.connections[c];
                let d = connection.distance;
                let pop_from = self.locales[connection.from.0].pop0 as f64;
                let pop_to = self.locales[connection.to.0].pop0 as f64;
                connection.w = 1.0 / d;
                connection.gw = pop_from * pop_to / (d * d);
                w_total += connection.w;
                gw_total += connection.gw;
            }
            for &c in outbound {
                let connection = &mut self.connections[c];
                connection.w /= w_total;
                // Zero-population endpoints leave no gravity; fall back to distance.
                connection.gw = if gw_total > 0.0 {
                    connection.gw / gw_total
                } else {
                    connection.w
                };
            }
        }
        Ok(())
    }

    /// Sum of the chosen weight over the outbound connections of `from`.
    #[must_use]
    pub fn outbound_weight(&self, from: LocaleId, weighting: Weighting) -> f64 {
        self.outbound(from)
            .map(|connection| connection.weight(weighting))
            .sum()
    }

    /// The first outbound connection whose cumulative weight is at least `draw`.
    ///
    /// `draw` is expected in `[0, outbound_weight)`. A draw past the last cumulative
    /// weight (rounding) selects the last connection. Returns `None` for a locale
    /// without connections.
    #[must_use]
    pub fn select_neighbor(
        &self,
        from: LocaleId,
        weighting: Weighting,
        draw: f64,
    ) -> Option<&Connection> {
        let mut cumulative = 0.0;
        let mut last = None;
        for connection in self.outbound(from) {
            cumulative += connection.weight(weighting);
            if cumulative >= draw {
                return Some(connection);
            }
            last = Some(connection);
        }
        last
    }

    /// Sets the flow rate of a locale and recomputes every connection touching it.
    pub fn set_flow_rate(&mut self, id: LocaleId, flow_rate: f64) {
        self.locales[id.0].flow_rate = flow_rate;
        for position in 0..self.outbound[id.0].len() {
            let c = self.outbound[id.0][position];
            let to = self.connections[c].to;
            let rate = flow_rate.min(self.locales[to.0].flow_rate);
            self.connections[c].flow_rate = rate;
            for &back in &self.outbound[to.0] {
                if self.connections[back].to == id {
                    self.connections[back].flow_rate = rate;
                }
            }
        }
    }

    /// Locales scattered over a square with Gamma-distributed populations.
    ///
    /// Every locale is first linked to its nearest locale it is not yet linked to,
    /// so no locale is left without a connection. Random locales are then linked to
    /// their nearest non-neighbor until there are `edges_per_locale * locales` links
    /// (or the network is complete). A target below what the first pass adds leaves
    /// the network as the first pass built it.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if fewer than two locales are requested.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn random<R: Rng + ?Sized>(
        rng: &mut R,
        locales: usize,
        total_population: u64,
        population_cv: f64,
        edges_per_locale: f64,
        extent: f64,
    ) -> Result<Network, BranchingError> {
        if locales < 2 {
            return Err(BranchingError::NetworkError(
                "a random network needs at least two locales".to_string(),
            ));
        }
        let mean = total_population as f64 / locales as f64;
        let shape = 1.0 / (population_cv * population_cv);
        let scale = mean / shape;
        let raw: Vec<f64> = (0..locales).map(|_| gamma(rng, shape, scale)).collect();
        let populations = apportion(&raw, total_population);

        let mut network = Network::new();
        for (i, population) in populations.into_iter().enumerate() {
            let x = uniform(rng) * extent;
            let y = uniform(rng) * extent;
            network.add_locale(format!("L{i}"), population, x, y)?;
        }

        let max_links = locales * (locales - 1) / 2;
        let target = ((edges_per_locale * locales as f64).round() as usize).min(max_links);

        for i in 0..locales {
            network.link_nearest_non_neighbor(LocaleId(i))?;
        }
        while network.link_count() < target {
            let i = rng.random_range(0..locales);
            network.link_nearest_non_neighbor(LocaleId(i))?;
        }
        Ok(network)
    }

    /// Returns true if a link was added.
    fn link_nearest_non_neighbor(&mut self, id: LocaleId) -> Result<bool, BranchingError> {
        let origin = &self.locales[id.0];
        let nearest = self
            .locales
            .iter()
            .filter(|other| other.id != id && !self.has_link(id, other.id))
            .map(|other| (other.id, origin.distance_to(other)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((other, distance)) => {
                // Coincident points still need a usable distance.
                self.add_link(id, other, distance.max(MIN_DISTANCE))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reads locales and links from CSV tables.
    ///
    /// Locales have columns `name,population,x,y`; links have `from,to,distance`
    /// with locale names in `from` and `to`. A link with no distance uses the
    /// Euclidean distance between the locales. Without a links file every pair is
    /// linked. Links longer than `max_distance` are dropped.
    ///
    /// # Errors
    ///
    /// Returns a `BranchingError` if a file cannot be read or parsed, or names an
    /// unknown locale.
    pub fn from_tables(
        locales_file: &Path,
        edges_file: Option<&Path>,
        max_distance: Option<f64>,
    ) -> Result<Network, BranchingError> {
        let mut network = Network::new();
        let mut reader = csv::Reader::from_path(locales_file)?;
        for result in reader.deserialize() {
            let record: LocaleRecord = result?;
            network.add_locale(record.name, record.population, record.x, record.y)?;
        }

        let within = |distance: f64| max_distance.is_none_or(|max| distance <= max);
        let mut pruned = 0;

        if let Some(edges_file) = edges_file {
            let mut reader = csv::Reader::from_path(edges_file)?;
            for result in reader.deserialize() {
                let record: LinkRecord = result?;
                let from = network.require_locale(&record.from)?;
                let to = network.require_locale(&record.to)?;
                let distance = record
                    .distance
                    .unwrap_or_else(|| network.locale(from).distance_to(network.locale(to)));
                if !within(distance) {
                    pruned += 1;
                    continue;
                }
                // Tables commonly list both directions of a link.
                if network.has_link(from, to) {
                    continue;
                }
                network.add_link(from, to, distance)?;
            }
        } else {
            for a in 0..network.len() {
                for b in a + 1..network.len() {
                    let distance = network.locales[a].distance_to(&network.locales[b]);
                    if within(distance) {
                        network.add_link(LocaleId(a), LocaleId(b), distance.max(MIN_DISTANCE))?;
                    } else {
                        pruned += 1;
                    }
                }
            }
        }
        debug!("pruned {pruned} links beyond the maximum distance");
        Ok(network)
    }

    fn require_locale(&self, name: &str) -> Result<LocaleId, BranchingError> {
        self.locale_id(name).ok_or_else(|| {
            BranchingError::NetworkError(format!("link names unknown locale {name}"))
        })
    }
}

/// Smallest distance used for coincident locales.
const MIN_DISTANCE: f64 = 1e-6;

/// Scales `raw` to integers summing to `total`, by largest remainder, giving every
/// entry at least one when `total` allows it.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn apportion(raw: &[f64], total: u64) -> Vec<u64> {
    let sum: f64 = raw.iter().sum();
    let exact: Vec<f64> = raw
        .iter()
        .map(|value| value / sum * total as f64)
        .collect();
    let mut counts: Vec<u64> = exact.iter().map(|value| value.floor() as u64).collect();
    let assigned: u64 = counts.iter().sum();

    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| {
        let frac_a = exact[a] - exact[a].floor();
        let frac_b = exact[b] - exact[b].floor();
        frac_b.total_cmp(&frac_a).then(a.cmp(&b))
    });
    for &i in order.iter().cycle().take(total.saturating_sub(assigned) as usize) {
        counts[i] += 1;
    }

    // Move single people from the largest locale into empty ones.
    while let Some(empty) = counts.iter().position(|&count| count == 0) {
        let largest = (0..counts.len())
            .max_by_key(|&i| (counts[i], std::cmp::Reverse(i)))
            .unwrap_or(empty);
        if counts[largest] <= 1 {
            break;
        }
        counts[largest] -= 1;
        counts[empty] += 1;
    }
    counts
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use crate::numeric::sums_to_one;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn line(populations: &[u64]) -> Network {
        // Locales on a line, one unit apart, each linked to the next.
        let mut network = Network::new();
        for (i, population) in populations.iter().enumerate() {
            network
                .add_locale(format!("L{i}"), *population, i as f64, 0.0)
                .unwrap();
        }
        for i in 1..populations.len() {
            network.add_link(LocaleId(i - 1), LocaleId(i), 1.0).unwrap();
        }
        network
    }

    fn rate(network: &Network, a: usize, b: usize) -> f64 {
        network
            .connection(LocaleId(a), LocaleId(b))
            .unwrap()
            .flow_rate
    }

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn add_link_rejects_bad_links() {
        let mut network = line(&[10, 10]);
        assert!(matches!(
            network.add_link(LocaleId(0), LocaleId(0), 1.0),
            Err(BranchingError::NetworkError(_))
        ));
        assert!(network.add_link(LocaleId(0), LocaleId(1), 2.0).is_err());
        let c = network.add_locale("c".to_string(), 1, 0.0, 0.0).unwrap();
        assert!(network.add_link(LocaleId(0), c, 0.0).is_err());
        assert!(network.add_link(LocaleId(0), c, f64::NAN).is_err());
        assert!(network.add_locale("c".to_string(), 1, 0.0, 0.0).is_err());
    }

    #[test]
    fn links_are_bidirectional() {
        let network = line(&[10, 20, 30]);
        assert_eq!(network.link_count(), 2);
        assert_eq!(network.degree(LocaleId(1)), 2);
        assert!(network.has_link(LocaleId(2), LocaleId(1)));
        assert!(!network.has_link(LocaleId(0), LocaleId(2)));
    }

    #[test]
    fn reweight_normalizes_both_weights() {
        let mut network = line(&[10, 20, 30]);
        network.add_link(LocaleId(0), LocaleId(2), 2.0).unwrap();
        network.reweight().unwrap();
        for locale in network.locales() {
            assert!(sums_to_one(network.outbound(locale.id).map(|c| c.w)));
            assert!(sums_to_one(network.outbound(locale.id).map(|c| c.gw)));
        }
        // From L0: w is 1/1 and 1/2, gravity is 10*20/1 and 10*30/4
        let to_1 = network.connection(LocaleId(0), LocaleId(1)).unwrap();
        assert_approx_eq!(to_1.w, 2.0 / 3.0);
        assert_approx_eq!(to_1.gw, 200.0 / 275.0);
    }

    #[test]
    fn reweight_rejects_isolated_locale() {
        let mut network = line(&[10, 20]);
        network.add_locale("alone".to_string(), 5, 9.0, 9.0).unwrap();
        let error = network.reweight().unwrap_err();
        assert!(matches!(error, BranchingError::NetworkError(ref m) if m.contains("alone")));
    }

    #[test]
    fn select_neighbor_uses_cumulative_weight() {
        let mut network = line(&[10, 10, 10]);
        network.reweight().unwrap();
        // L1 links to L0 then L2, equal distance: cumulative 0.5, 1.0
        let pick = |draw| {
            network
                .select_neighbor(LocaleId(1), Weighting::Distance, draw)
                .unwrap()
                .to
        };
        assert_eq!(pick(0.0), LocaleId(0));
        assert_eq!(pick(0.5), LocaleId(0));
        assert_eq!(pick(0.500_001), LocaleId(2));
        assert_eq!(pick(1.0), LocaleId(2));
        // Past the end by rounding
        assert_eq!(pick(1.000_000_1), LocaleId(2));
    }

    #[test]
    fn select_neighbor_without_connections() {
        let mut network = Network::new();
        let only = network.add_locale("a".to_string(), 1, 0.0, 0.0).unwrap();
        assert!(network
            .select_neighbor(only, Weighting::Gravity, 0.1)
            .is_none());
    }

    #[test]
    fn flow_rate_is_minimum_of_endpoints() {
        let mut network = line(&[10, 10, 10]);
        network.set_flow_rate(LocaleId(0), 0.5);
        network.set_flow_rate(LocaleId(1), 0.2);
        network.set_flow_rate(LocaleId(2), 0.4);
        assert_approx_eq!(rate(&network, 0, 1), 0.2);
        assert_approx_eq!(rate(&network, 1, 0), 0.2);
        assert_approx_eq!(rate(&network, 2, 1), 0.2);
        network.set_flow_rate(LocaleId(1), 1.0);
        assert_approx_eq!(rate(&network, 0, 1), 0.5);
        assert_approx_eq!(rate(&network, 1, 0), 0.5);
        assert_approx_eq!(rate(&network, 1, 2), 0.4);
    }

    #[test]
    fn random_network_is_connected_and_normalized() {
        let mut rng = SmallRng::seed_from_u64(42);
        let setup = NetworkSetup::Random {
            locales: 25,
            total_population: 100_000,
            population_cv: 1.5,
            edges_per_locale: 2.0,
            extent: 100.0,
        };
        let network = Network::build(&mut rng, &setup).unwrap();
        assert_eq!(network.len(), 25);
        assert_eq!(network.link_count(), 50);
        assert_eq!(network.total_population(), 100_000);
        for locale in network.locales() {
            assert!(locale.pop0 >= 1);
            assert!(network.degree(locale.id) >= 1);
            assert!(sums_to_one(network.outbound(locale.id).map(|c| c.w)));
            assert!(sums_to_one(network.outbound(locale.id).map(|c| c.gw)));
        }
    }

    #[test]
    fn random_network_is_reproducible() {
        let setup = NetworkSetup::default();
        let a = Network::build(&mut SmallRng::seed_from_u64(7), &setup).unwrap();
        let b = Network::build(&mut SmallRng::seed_from_u64(7), &setup).unwrap();
        assert_eq!(a.connections(), b.connections());
        let pops = |n: &Network| n.locales().iter().map(|l| l.pop0).collect::<Vec<_>>();
        assert_eq!(pops(&a), pops(&b));
    }

    #[test]
    fn sparse_random_network_still_links_every_locale() {
        // 0.4 links per locale is below what the first pass adds
        let setup = NetworkSetup::Random {
            locales: 10,
            total_population: 10_000,
            population_cv: 0.5,
            edges_per_locale: 0.4,
            extent: 50.0,
        };
        for seed in 0..20 {
            let network = Network::build(&mut SmallRng::seed_from_u64(seed), &setup).unwrap();
            // One link per locale from the first pass, none from the second
            assert_eq!(network.link_count(), 10);
            for locale in network.locales() {
                assert!(network.degree(locale.id) >= 1);
                assert!(sums_to_one(network.outbound(locale.id).map(|c| c.w)));
            }
        }
    }

    #[test]
    fn random_network_caps_links_at_complete_graph() {
        let mut rng = SmallRng::seed_from_u64(1);
        let network = Network::random(&mut rng, 4, 400, 1.0, 10.0, 10.0).unwrap();
        assert_eq!(network.link_count(), 6);
    }

    #[test]
    fn isolated_network_skips_reweighting() {
        let mut rng = SmallRng::seed_from_u64(1);
        let setup = NetworkSetup::Isolated {
            name: "home".to_string(),
            population: 1000,
        };
        let network = Network::build(&mut rng, &setup).unwrap();
        assert_eq!(network.len(), 1);
        assert_eq!(network.degree(LocaleId(0)), 0);
        assert_eq!(network.locale_id("home"), Some(LocaleId(0)));
    }

    #[test]
    fn tables_with_links_and_pruning() {
        let locales = csv_file("name,population,x,y\na,100,0,0\nb,200,3,4\nc,300,0,50\n");
        let links = csv_file("from,to,distance\na,b,\nb,a,5\nb,c,40\na,c,100\n");
        let network = Network::from_tables(locales.path(), Some(links.path()), Some(60.0)).unwrap();
        assert_eq!(network.len(), 3);
        assert_eq!(network.link_count(), 2);
        assert_approx_eq!(
            network
                .connection(LocaleId(0), LocaleId(1))
                .unwrap()
                .distance,
            5.0
        );
        assert!(!network.has_link(LocaleId(0), LocaleId(2)));
    }

    #[test]
    fn pruning_that_isolates_a_locale_is_fatal() {
        let locales = csv_file("name,population,x,y\na,100,0,0\nb,200,1,0\nfar,300,500,0\n");
        let setup = NetworkSetup::Table {
            locales_file: locales.path().to_path_buf(),
            edges_file: None,
            max_distance: Some(10.0),
        };
        let result = Network::build(&mut SmallRng::seed_from_u64(0), &setup);
        assert!(matches!(result, Err(BranchingError::NetworkError(ref m)) if m.contains("far")));
    }

    #[test]
    fn tables_reject_unknown_locale() {
        let locales = csv_file("name,population,x,y\na,100,0,0\nb,200,1,0\n");
        let links = csv_file("from,to,distance\na,z,1\n");
        assert!(Network::from_tables(locales.path(), Some(links.path()), None).is_err());
    }

    #[test]
    fn apportion_preserves_total() {
        let counts = apportion(&[0.1, 5.0, 2.5, 0.0001], 1000);
        assert_eq!(counts.iter().sum::<u64>(), 1000);
        assert!(counts.iter().all(|&count| count >= 1));
        assert_eq!(apportion(&[1.0, 1.0, 1.0], 10), vec![4, 3, 3]);
    }
}
