use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::types::*;

/// What a call to [`Simulation::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Forces were applied and the simulation wants more ticks.
    Running,
    /// Forces were applied and alpha dropped below `alpha_min`; the simulation stopped itself.
    Settled,
    /// The simulation is stopped; nothing moved.
    Stopped,
}

#[derive(Debug, Clone, Default)]
struct Body {
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    fixed: Option<Position>,
    secondary: bool,
    radius: f64,
    trap: Option<usize>,
}

/// Velocity-Verlet style force integrator in the manner of d3-force.
///
/// Per-tick caches (adjacency, degree, radius) are built by [`Simulation::rebuild`]
/// and must be rebuilt after every structural edit of the node set. A tick that
/// sees a different node count than the cache fails with
/// [`LayoutError::StaleCache`] instead of silently mixing up bodies.
pub struct Simulation {
    config: ForceConfig,
    alpha: f64,
    running: bool,
    bodies: Vec<Body>,
    links: Vec<(usize, usize)>,
    adjacency: Vec<Vec<usize>>,
    traps: Vec<Vec<Position>>,
    rng: StdRng,
    ticks: u64,
}

impl Simulation {
    pub fn new(config: ForceConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            alpha: 1.0,
            running: false,
            bodies: Vec::new(),
            links: Vec::new(),
            adjacency: Vec::new(),
            traps: Vec::new(),
            rng,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &ForceConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ForceConfig) -> Result<(), LayoutError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha.max(0.0);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn node_count(&self) -> usize {
        self.bodies.len()
    }

    /// Degree of node `index` as seen by the last rebuild.
    pub fn degree(&self, index: usize) -> Option<usize> {
        self.adjacency.get(index).map(Vec::len)
    }

    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.adjacency.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the path constraints that trapped nodes are projected onto.
    pub fn set_traps(&mut self, traps: Vec<Vec<Position>>) {
        self.traps = traps;
    }

    pub fn stop(&mut self) {
        if self.running {
            debug!(ticks = self.ticks, alpha = self.alpha, "simulation stopped");
        }
        self.running = false;
    }

    /// Reheat to full energy and start ticking again.
    pub fn restart(&mut self) {
        self.alpha = 1.0;
        self.running = true;
        debug!(nodes = self.bodies.len(), "simulation restarted");
    }

    /// Continue ticking without changing alpha.
    pub fn resume(&mut self) {
        self.running = self.alpha >= self.config.alpha_min;
    }

    /// Rebuild the per-tick caches from the current node set.
    ///
    /// `links` are index pairs into the same order the nodes are supplied in,
    /// and the same order must be used for every subsequent tick.
    pub fn rebuild(
        &mut self,
        specs: impl IntoIterator<Item = BodySpec>,
        links: &[(usize, usize)],
    ) -> Result<(), LayoutError> {
        let center = self.config.center;
        let bodies: Vec<Body> = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| {
                let mut pos = spec.position;
                if !pos.x.is_finite() || !pos.y.is_finite() {
                    pos = initial_position(i, center);
                }
                Body {
                    x: pos.x,
                    y: pos.y,
                    vx: 0.0,
                    vy: 0.0,
                    fixed: spec.pinned,
                    secondary: spec.secondary,
                    radius: spec.radius.max(0.0),
                    trap: spec.trap,
                }
            })
            .collect();

        let n = bodies.len();
        let mut adjacency = vec![Vec::new(); n];
        for &(s, t) in links {
            if s >= n {
                return Err(LayoutError::InvalidNodeIndex(s));
            }
            if t >= n {
                return Err(LayoutError::InvalidNodeIndex(t));
            }
            adjacency[s].push(t);
            adjacency[t].push(s);
        }

        self.bodies = bodies;
        self.links = links.to_vec();
        self.adjacency = adjacency;
        trace!(nodes = n, links = links.len(), "simulation caches rebuilt");
        Ok(())
    }

    /// Apply one integration step and write the resulting positions back.
    pub fn tick<'a, N: LayoutNode + 'a>(
        &mut self,
        nodes: impl IntoIterator<Item = &'a mut N>,
    ) -> Result<TickOutcome, LayoutError> {
        let mut nodes: Vec<&'a mut N> = nodes.into_iter().collect();
        if nodes.len() != self.bodies.len() {
            return Err(LayoutError::StaleCache {
                expected: self.bodies.len(),
                found: nodes.len(),
            });
        }
        if !self.running {
            return Ok(TickOutcome::Stopped);
        }

        // Positions and pins may have been edited between ticks (dragging).
        for (body, node) in self.bodies.iter_mut().zip(nodes.iter()) {
            let pos = node.position();
            if pos.x.is_finite() && pos.y.is_finite() {
                body.x = pos.x;
                body.y = pos.y;
            }
            body.fixed = node.pinned();
        }

        self.step();

        for (body, node) in self.bodies.iter().zip(nodes.iter_mut()) {
            node.set_position(Position::new(body.x, body.y));
        }

        if self.alpha < self.config.alpha_min {
            self.running = false;
            debug!(ticks = self.ticks, "simulation settled");
            return Ok(TickOutcome::Settled);
        }
        Ok(TickOutcome::Running)
    }

    /// Tick until the simulation settles or `max_ticks` is reached.
    /// Returns the number of ticks taken.
    pub fn run<N: LayoutNode>(
        &mut self,
        nodes: &mut [N],
        max_ticks: usize,
    ) -> Result<usize, LayoutError> {
        for taken in 0..max_ticks {
            match self.tick(nodes.iter_mut())? {
                TickOutcome::Running => {}
                TickOutcome::Settled => return Ok(taken + 1),
                TickOutcome::Stopped => return Ok(taken),
            }
        }
        Ok(max_ticks)
    }

    fn step(&mut self) {
        self.alpha += (self.config.alpha_target - self.alpha) * self.config.alpha_decay;
        self.ticks += 1;
        let alpha = self.alpha;

        let Simulation {
            config,
            bodies,
            links,
            adjacency,
            traps,
            rng,
            ..
        } = self;

        apply_links(config, bodies, links, adjacency, alpha, rng);
        apply_charge(config, bodies, alpha, rng);
        apply_centering(config, bodies, adjacency, alpha);
        apply_collision(config, bodies, rng);

        let keep = 1.0 - config.velocity_decay;
        for body in bodies.iter_mut() {
            match body.fixed {
                Some(pin) => {
                    body.x = pin.x;
                    body.y = pin.y;
                    body.vx = 0.0;
                    body.vy = 0.0;
                }
                None => {
                    body.vx *= keep;
                    body.vy *= keep;
                    body.x += body.vx;
                    body.y += body.vy;
                }
            }
            if body.fixed.is_none() {
                if let Some(path) = body.trap.and_then(|k| traps.get(k)) {
                    let p = project_onto_polyline(Position::new(body.x, body.y), path);
                    body.x = p.x;
                    body.y = p.y;
                }
            }
        }
    }
}

fn jiggle(rng: &mut StdRng) -> f64 {
    (rng.random::<f64>() - 0.5) * 1e-6
}

/// Share of a link correction taken by the target: fixed ends take none.
fn link_bias(bodies: &[Body], adjacency: &[Vec<usize>], s: usize, t: usize) -> f64 {
    match (bodies[s].fixed.is_some(), bodies[t].fixed.is_some()) {
        (false, true) => 0.0,
        (true, false) => 1.0,
        _ => {
            let ds = adjacency[s].len() as f64;
            let dt = adjacency[t].len() as f64;
            ds / (ds + dt)
        }
    }
}

fn apply_links(
    config: &ForceConfig,
    bodies: &mut [Body],
    links: &[(usize, usize)],
    adjacency: &[Vec<usize>],
    alpha: f64,
    rng: &mut StdRng,
) {
    for &(s, t) in links {
        if s == t {
            continue;
        }
        let strength = config.link_strength.unwrap_or_else(|| {
            1.0 / adjacency[s].len().min(adjacency[t].len()).max(1) as f64
        });
        let mut x = bodies[t].x + bodies[t].vx - bodies[s].x - bodies[s].vx;
        let mut y = bodies[t].y + bodies[t].vy - bodies[s].y - bodies[s].vy;
        if x == 0.0 {
            x = jiggle(rng);
        }
        if y == 0.0 {
            y = jiggle(rng);
        }
        let mut l = (x * x + y * y).sqrt();
        l = (l - config.link_distance) / l * alpha * strength;
        x *= l;
        y *= l;
        let b = link_bias(bodies, adjacency, s, t);
        bodies[t].vx -= x * b;
        bodies[t].vy -= y * b;
        bodies[s].vx += x * (1.0 - b);
        bodies[s].vy += y * (1.0 - b);
    }
}

fn apply_charge(config: &ForceConfig, bodies: &mut [Body], alpha: f64, rng: &mut StdRng) {
    let strength = |b: &Body| {
        if b.secondary {
            config.secondary_charge_strength
        } else {
            config.charge_strength
        }
    };
    let max2 = config.charge_distance_max * config.charge_distance_max;
    let min2 = 1.0;
    let n = bodies.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (si, sj) = (strength(&bodies[i]), strength(&bodies[j]));
            if si == 0.0 && sj == 0.0 {
                continue;
            }
            let mut dx = bodies[j].x - bodies[i].x;
            let mut dy = bodies[j].y - bodies[i].y;
            let mut l = dx * dx + dy * dy;
            if l >= max2 {
                continue;
            }
            if dx == 0.0 {
                dx = jiggle(rng);
                l += dx * dx;
            }
            if dy == 0.0 {
                dy = jiggle(rng);
                l += dy * dy;
            }
            if l < min2 {
                l = (min2 * l).sqrt();
            }
            bodies[i].vx += dx * sj * alpha / l;
            bodies[i].vy += dy * sj * alpha / l;
            bodies[j].vx -= dx * si * alpha / l;
            bodies[j].vy -= dy * si * alpha / l;
        }
    }
}

fn apply_centering(
    config: &ForceConfig,
    bodies: &mut [Body],
    adjacency: &[Vec<usize>],
    alpha: f64,
) {
    // Anchors are computed from positions before any body is nudged.
    let anchors: Vec<Option<Position>> = (0..bodies.len())
        .map(|i| {
            if !bodies[i].secondary {
                return Some(config.center);
            }
            let points: Vec<Position> = adjacency[i]
                .iter()
                .filter(|&&j| !bodies[j].secondary)
                .map(|&j| Position::new(bodies[j].x, bodies[j].y))
                .collect();
            Position::centroid(&points)
        })
        .collect();

    for (body, anchor) in bodies.iter_mut().zip(anchors) {
        let Some(anchor) = anchor else {
            continue;
        };
        let k = if body.secondary {
            config.secondary_center_strength
        } else {
            config.center_strength
        };
        body.vx += (anchor.x - body.x) * k * alpha;
        body.vy += (anchor.y - body.y) * k * alpha;
    }
}

fn apply_collision(config: &ForceConfig, bodies: &mut [Body], rng: &mut StdRng) {
    if config.collision_strength == 0.0 {
        return;
    }
    let radius = |b: &Body| {
        if b.secondary {
            0.0
        } else {
            b.radius + config.collision_padding
        }
    };
    let n = bodies.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (ri, rj) = (radius(&bodies[i]), radius(&bodies[j]));
            let r = ri + rj;
            if r <= 0.0 {
                continue;
            }
            let mut x = bodies[i].x + bodies[i].vx - bodies[j].x - bodies[j].vx;
            let mut y = bodies[i].y + bodies[i].vy - bodies[j].y - bodies[j].vy;
            let mut l = x * x + y * y;
            if l >= r * r {
                continue;
            }
            if x == 0.0 {
                x = jiggle(rng);
                l += x * x;
            }
            if y == 0.0 {
                y = jiggle(rng);
                l += y * y;
            }
            let d = l.sqrt();
            let push = (r - d) / d * config.collision_strength;
            x *= push;
            y *= push;
            let (ri2, rj2) = (ri * ri, rj * rj);
            let share = rj2 / (ri2 + rj2);
            bodies[i].vx += x * share;
            bodies[i].vy += y * share;
            bodies[j].vx -= x * (1.0 - share);
            bodies[j].vy -= y * (1.0 - share);
        }
    }
}

/// Seed position for node `index`: a phyllotaxis spiral around `center`.
pub fn initial_position(index: usize, center: Position) -> Position {
    let radius = 10.0 * (0.5 + index as f64).sqrt();
    let angle = index as f64 * std::f64::consts::PI * (3.0 - 5f64.sqrt());
    Position::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
}

/// Closest point to `p` on the polyline `path`.
pub fn project_onto_polyline(p: Position, path: &[Position]) -> Position {
    match path {
        [] => p,
        [only] => *only,
        _ => {
            let mut best = path[0];
            let mut best_d = f64::INFINITY;
            for seg in path.windows(2) {
                let (a, b) = (seg[0], seg[1]);
                let (abx, aby) = (b.x - a.x, b.y - a.y);
                let len2 = abx * abx + aby * aby;
                let t = if len2 == 0.0 {
                    0.0
                } else {
                    (((p.x - a.x) * abx + (p.y - a.y) * aby) / len2).clamp(0.0, 1.0)
                };
                let q = a.lerp(&b, t);
                let d = q.distance(&p);
                if d < best_d {
                    best_d = d;
                    best = q;
                }
            }
            best
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Dot {
        pos: Position,
        pin: Option<Position>,
        secondary: bool,
        radius: f64,
        trap: Option<usize>,
    }

    impl Dot {
        fn at(x: f64, y: f64) -> Self {
            Self {
                pos: Position::new(x, y),
                pin: None,
                secondary: false,
                radius: 5.0,
                trap: None,
            }
        }
    }

    impl LayoutNode for Dot {
        fn position(&self) -> Position {
            self.pos
        }
        fn set_position(&mut self, pos: Position) {
            self.pos = pos;
        }
        fn pinned(&self) -> Option<Position> {
            self.pin
        }
    }

    fn specs(nodes: &[Dot]) -> Vec<BodySpec> {
        nodes
            .iter()
            .map(|d| BodySpec {
                position: d.pos,
                pinned: d.pin,
                secondary: d.secondary,
                radius: d.radius,
                trap: d.trap,
            })
            .collect()
    }

    #[test]
    fn test_pinned_node_does_not_move() {
        let mut nodes = vec![Dot::at(0.0, 0.0), Dot::at(10.0, 0.0)];
        nodes[0].pin = Some(Position::new(0.0, 0.0));
        let mut sim = Simulation::new(ForceConfig::default());
        sim.rebuild(specs(&nodes), &[(0, 1)]).unwrap();
        sim.restart();
        sim.run(&mut nodes, 50).unwrap();

        assert_eq!(nodes[0].pos, Position::new(0.0, 0.0));
        assert_ne!(nodes[1].pos, Position::new(10.0, 0.0));
    }

    #[test]
    fn test_settles_and_stops() {
        let mut nodes = vec![Dot::at(0.0, 0.0), Dot::at(30.0, 0.0), Dot::at(0.0, 40.0)];
        let mut sim = Simulation::new(ForceConfig::default());
        sim.rebuild(specs(&nodes), &[(0, 1), (1, 2)]).unwrap();
        sim.restart();
        let taken = sim.run(&mut nodes, 10_000).unwrap();

        assert!(taken < 10_000);
        assert!(!sim.is_running());
        assert_eq!(sim.tick(nodes.iter_mut()).unwrap(), TickOutcome::Stopped);
    }

    #[test]
    fn test_stale_cache_is_rejected() {
        let mut nodes = vec![Dot::at(0.0, 0.0), Dot::at(10.0, 0.0)];
        let mut sim = Simulation::new(ForceConfig::default());
        sim.rebuild(specs(&nodes), &[]).unwrap();
        sim.restart();
        nodes.push(Dot::at(5.0, 5.0));

        let err = sim.tick(nodes.iter_mut()).unwrap_err();
        assert_eq!(
            err,
            LayoutError::StaleCache {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_rebuild_rejects_dangling_link() {
        let nodes = vec![Dot::at(0.0, 0.0)];
        let mut sim = Simulation::new(ForceConfig::default());
        assert_eq!(
            sim.rebuild(specs(&nodes), &[(0, 3)]),
            Err(LayoutError::InvalidNodeIndex(3))
        );
    }

    #[test]
    fn test_repulsion_pushes_unlinked_nodes_apart() {
        let mut nodes = vec![Dot::at(395.0, 300.0), Dot::at(405.0, 300.0)];
        let config = ForceConfig {
            center_strength: 0.0,
            collision_strength: 0.0,
            ..Default::default()
        };
        let mut sim = Simulation::new(config);
        sim.rebuild(specs(&nodes), &[]).unwrap();
        sim.restart();
        sim.run(&mut nodes, 100).unwrap();

        assert!(nodes[0].pos.distance(&nodes[1].pos) > 10.0);
    }

    #[test]
    fn test_secondary_pulled_toward_its_neighbor() {
        let mut nodes = vec![Dot::at(0.0, 0.0), Dot::at(300.0, 0.0)];
        nodes[0].pin = Some(Position::new(0.0, 0.0));
        nodes[1].secondary = true;
        let config = ForceConfig {
            link_strength: Some(0.0),
            charge_strength: 0.0,
            secondary_charge_strength: 0.0,
            ..Default::default()
        };
        let mut sim = Simulation::new(config);
        sim.rebuild(specs(&nodes), &[(0, 1)]).unwrap();
        sim.restart();
        sim.run(&mut nodes, 300).unwrap();

        assert!(nodes[1].pos.distance(&nodes[0].pos) < 50.0);
    }

    #[test]
    fn test_trapped_node_stays_on_path() {
        let mut nodes = vec![Dot::at(0.0, 50.0), Dot::at(100.0, 0.0)];
        nodes[0].trap = Some(0);
        let mut sim = Simulation::new(ForceConfig::default());
        sim.set_traps(vec![vec![Position::new(-100.0, 0.0), Position::new(100.0, 0.0)]]);
        sim.rebuild(specs(&nodes), &[(0, 1)]).unwrap();
        sim.restart();
        sim.run(&mut nodes, 40).unwrap();

        assert!(nodes[0].pos.y.abs() < 1e-9);
        assert!((-100.0..=100.0).contains(&nodes[0].pos.x));
    }

    #[test]
    fn test_unplaced_nodes_are_seeded() {
        let mut nodes = vec![Dot::at(f64::NAN, f64::NAN), Dot::at(f64::NAN, 0.0)];
        let mut sim = Simulation::new(ForceConfig::default());
        sim.rebuild(specs(&nodes), &[]).unwrap();
        sim.restart();
        sim.tick(nodes.iter_mut()).unwrap();

        assert!(nodes.iter().all(|n| n.pos.x.is_finite() && n.pos.y.is_finite()));
    }

    #[test]
    fn test_project_onto_polyline() {
        let path = [Position::new(0.0, 0.0), Position::new(10.0, 0.0), Position::new(10.0, 10.0)];
        assert_eq!(
            project_onto_polyline(Position::new(5.0, 3.0), &path),
            Position::new(5.0, 0.0)
        );
        assert_eq!(
            project_onto_polyline(Position::new(14.0, 6.0), &path),
            Position::new(10.0, 6.0)
        );
    }
}
