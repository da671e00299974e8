/**
 * CPU-side triangle data of one material group, as the loaders produce it and the
 * geometry builder uploads it. Attributes are stored per vertex in separate arrays
 * because every attribute ends up in its own buffer.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tangents: Vec<[f32; 3]>,
    pub bitangents: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Appends `other`, rebasing its indices.
    pub fn append(&mut self, other: MeshData) {
        let base = self.positions.len() as u32;
        self.positions.extend(other.positions);
        self.normals.extend(other.normals);
        self.tangents.extend(other.tangents);
        self.bitangents.extend(other.bitangents);
        self.tex_coords.extend(other.tex_coords);
        self.indices.extend(other.indices.into_iter().map(|i| i + base));
    }

    /// Checks what the builder relies on: whole triangles, indices in range and
    /// one entry per vertex in every attribute array.
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err(format!(
                "index count {} is not a multiple of three",
                self.indices.len()
            ));
        }
        let vertex_count = self.vertex_count();
        if let Some(index) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(format!(
                "index {index} is out of range for {vertex_count} vertices"
            ));
        }
        let lengths = [
            ("normals", self.normals.len()),
            ("tangents", self.tangents.len()),
            ("bitangents", self.bitangents.len()),
            ("texture coordinates", self.tex_coords.len()),
        ];
        for (name, len) in lengths {
            if len != vertex_count {
                return Err(format!(
                    "{name} has {len} entries but there are {vertex_count} positions"
                ));
            }
        }
        Ok(())
    }

    /**
     * Obj files (and some glTF files) don't come with tangents and bitangents so they
     * have to be calculated for normal maps to work correctly.
     */
    pub fn compute_tangents(&mut self) {
        let vertex_count = self.vertex_count();
        self.tangents = vec![[0.0; 3]; vertex_count];
        self.bitangents = vec![[0.0; 3]; vertex_count];
        let mut triangles_included = vec![0; vertex_count];

        // We're going to use the triangles, so we need to loop through the
        // indices in chunks of 3
        for c in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [c[0] as usize, c[1] as usize, c[2] as usize];

            let pos0: cgmath::Vector3<f32> = self.positions[i0].into();
            let pos1: cgmath::Vector3<f32> = self.positions[i1].into();
            let pos2: cgmath::Vector3<f32> = self.positions[i2].into();

            let uv0: cgmath::Vector2<f32> = self.tex_coords[i0].into();
            let uv1: cgmath::Vector2<f32> = self.tex_coords[i1].into();
            let uv2: cgmath::Vector2<f32> = self.tex_coords[i2].into();

            // Calculate the edges of the triangle
            let delta_pos1 = pos1 - pos0;
            let delta_pos2 = pos2 - pos0;

            // This will give us a direction to calculate the
            // tangent and bitangent
            let delta_uv1 = uv1 - uv0;
            let delta_uv2 = uv2 - uv0;

            // Solving the following system of equations will
            // give us the tangent and bitangent.
            //     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
            //     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
            let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
            if det.abs() <= f32::EPSILON {
                // Degenerate uv mapping, nothing sensible to contribute
                continue;
            }
            let r = 1.0 / det;
            let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
            // We flip the bitangent to enable right-handed normal
            // maps with wgpu texture coordinate system
            let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

            // We'll use the same tangent/bitangent for each vertex in the triangle
            for i in [i0, i1, i2] {
                self.tangents[i] = (tangent + cgmath::Vector3::from(self.tangents[i])).into();
                self.bitangents[i] =
                    (bitangent + cgmath::Vector3::from(self.bitangents[i])).into();
                // Used to average the tangents/bitangents
                triangles_included[i] += 1;
            }
        }

        // Average the tangents/bitangents
        for (i, n) in triangles_included.into_iter().enumerate() {
            if n == 0 {
                continue;
            }
            let denom = 1.0 / n as f32;
            self.tangents[i] = (cgmath::Vector3::from(self.tangents[i]) * denom).into();
            self.bitangents[i] = (cgmath::Vector3::from(self.bitangents[i]) * denom).into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshData {
        MeshData {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            tex_coords: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            indices: vec![0, 1, 2, 0, 2, 3],
            ..Default::default()
        }
    }

    #[test]
    fn tangents_follow_u_direction() {
        let mut mesh = quad();
        mesh.compute_tangents();
        for tangent in &mesh.tangents {
            assert!((tangent[0] - 1.0).abs() < 1e-5);
            assert!(tangent[1].abs() < 1e-5);
        }
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut mesh = quad();
        mesh.compute_tangents();
        mesh.indices[5] = 9;
        assert!(mesh.validate().unwrap_err().contains("out of range"));
    }
}
